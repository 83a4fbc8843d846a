//! Auth API Endpoints
//!
//! - POST /auth/register - create an account on a trial subscription
//! - POST /auth/login - password login

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::auth::{AuthService, PasswordService};
use crate::shared::api_common::{is_valid_email, non_blank, FieldErrors};
use crate::shared::error::PlatformError;
use crate::user::api::UserResponse;
use crate::user::entity::{CompanyProfile, User};
use crate::user::repository::UserRepository;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub company_name: Option<String>,
}

impl RegisterRequest {
    fn validate(&self) -> Result<(), PlatformError> {
        let mut errors = FieldErrors::new();
        if self.email.trim().is_empty() {
            errors.add("email", "L'e-mail est obligatoire");
        } else if !is_valid_email(&self.email) {
            errors.add("email", "Adresse e-mail invalide");
        }
        errors.require("firstName", &self.first_name, "Le prénom est obligatoire");
        errors.require("lastName", &self.last_name, "Le nom est obligatoire");
        errors.finish()
    }
}

/// Login request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Issued token with the account it belongs to
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Clone)]
pub struct AuthState {
    pub auth_service: Arc<AuthService>,
    pub password_service: Arc<PasswordService>,
    pub user_repo: Arc<UserRepository>,
    pub trial_days: i64,
}

impl AuthState {
    fn token_for(&self, user: &User) -> Result<TokenResponse, PlatformError> {
        Ok(TokenResponse {
            token: self.auth_service.generate_access_token(user)?,
            token_type: "Bearer".to_string(),
            expires_in: self.auth_service.token_lifetime_secs(),
            user: UserResponse::from(user),
        })
    }
}

/// Create an account
#[utoipa::path(
    post,
    path = "/register",
    tag = "auth",
    operation_id = "postAuthRegister",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = TokenResponse),
        (status = 400, description = "Validation error or e-mail already used")
    )
)]
pub async fn register(
    State(state): State<AuthState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), PlatformError> {
    req.validate()?;
    let password_hash = state.password_service.hash_password(&req.password)?;

    let user = User::new(
        &req.email,
        password_hash,
        req.first_name.trim(),
        req.last_name.trim(),
        state.trial_days,
    )
    .with_company(CompanyProfile {
        company_name: non_blank(req.company_name),
        ..CompanyProfile::default()
    });

    state.user_repo.insert(&user).await?;
    info!(user_id = %user.id, "Account registered");

    Ok((StatusCode::CREATED, Json(state.token_for(&user)?)))
}

/// Password login
#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    operation_id = "postAuthLogin",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AuthState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, PlatformError> {
    let Some(user) = state.user_repo.find_by_email(&req.email).await? else {
        warn!("Login attempt for unknown e-mail");
        return Err(PlatformError::InvalidCredentials);
    };

    if !state.password_service.verify_password(&req.password, &user.password_hash)? {
        return Err(PlatformError::InvalidCredentials);
    }

    info!(user_id = %user.id, "User logged in");
    Ok(Json(state.token_for(&user)?))
}

pub fn auth_router(state: AuthState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(register))
        .routes(routes!(login))
        .with_state(state)
}
