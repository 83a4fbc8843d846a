//! Account API
//!
//! - GET /users/me - profile and company details
//! - PUT /users/me - update profile and company details
//! - GET /users/me/subscription - plan, status and enabled features

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::entity::{CompanyProfile, Feature, Plan, SubscriptionStatus, User};
use super::repository::UserRepository;
use crate::shared::api_common::{is_valid_email, non_blank, FieldErrors};
use crate::shared::error::PlatformError;
use crate::shared::middleware::Authenticated;

/// Account profile
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(flatten)]
    pub company: CompanyProfile,
    pub plan: Plan,
    pub created_at: String,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            company: u.company.clone(),
            plan: u.subscription.plan,
            created_at: u.created_at.to_rfc3339(),
        }
    }
}

/// Profile update. Absent fields are left unchanged, blank ones are cleared.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub company_address: Option<String>,
    pub company_postal_code: Option<String>,
    pub company_city: Option<String>,
    pub company_phone: Option<String>,
    pub company_email: Option<String>,
    pub siret: Option<String>,
    pub tva_number: Option<String>,
    pub logo_url: Option<String>,
}

impl UpdateProfileRequest {
    /// Validate and merge into `user`.
    pub fn apply(self, user: &mut User) -> Result<(), PlatformError> {
        let mut errors = FieldErrors::new();
        if let Some(first) = &self.first_name {
            errors.require("firstName", first, "Le prénom est obligatoire");
        }
        if let Some(last) = &self.last_name {
            errors.require("lastName", last, "Le nom est obligatoire");
        }
        if let Some(email) = self.company_email.as_deref().filter(|e| !e.trim().is_empty()) {
            if !is_valid_email(email) {
                errors.add("companyEmail", "Adresse e-mail invalide");
            }
        }
        if let Some(siret) = self.siret.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let digits: String = siret.chars().filter(|c| !c.is_whitespace()).collect();
            if digits.len() != 14 || !digits.chars().all(|c| c.is_ascii_digit()) {
                errors.add("siret", "Le SIRET doit comporter 14 chiffres");
            }
        }
        errors.finish()?;

        if let Some(first) = self.first_name {
            user.first_name = first.trim().to_string();
        }
        if let Some(last) = self.last_name {
            user.last_name = last.trim().to_string();
        }

        let company = &mut user.company;
        merge(&mut company.company_name, self.company_name);
        merge(&mut company.company_address, self.company_address);
        merge(&mut company.company_postal_code, self.company_postal_code);
        merge(&mut company.company_city, self.company_city);
        merge(&mut company.company_phone, self.company_phone);
        merge(&mut company.company_email, self.company_email);
        merge(&mut company.siret, self.siret);
        merge(&mut company.tva_number, self.tva_number);
        merge(&mut company.logo_url, self.logo_url);

        user.updated_at = Utc::now();
        Ok(())
    }
}

fn merge(target: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *target = non_blank(value);
    }
}

/// Subscription summary
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,
    pub active: bool,
    /// Features usable right now
    pub features: Vec<Feature>,
}

#[derive(Clone)]
pub struct UsersState {
    pub user_repo: Arc<UserRepository>,
}

async fn load_user(state: &UsersState, user_id: &str) -> Result<User, PlatformError> {
    state
        .user_repo
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| PlatformError::not_found("Compte", user_id))
}

/// Current account
#[utoipa::path(
    get,
    path = "/me",
    tag = "users",
    operation_id = "getUsersMe",
    responses(
        (status = 200, description = "Current account", body = UserResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(
    State(state): State<UsersState>,
    auth: Authenticated,
) -> Result<Json<UserResponse>, PlatformError> {
    let user = load_user(&state, &auth.user_id).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// Update profile and company details
#[utoipa::path(
    put,
    path = "/me",
    tag = "users",
    operation_id = "putUsersMe",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Validation error")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_me(
    State(state): State<UsersState>,
    auth: Authenticated,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, PlatformError> {
    let mut user = load_user(&state, &auth.user_id).await?;
    req.apply(&mut user)?;
    state.user_repo.update(&user).await?;

    info!(user_id = %user.id, "Profile updated");
    Ok(Json(UserResponse::from(&user)))
}

/// Current subscription
#[utoipa::path(
    get,
    path = "/me/subscription",
    tag = "users",
    operation_id = "getUsersMeSubscription",
    responses(
        (status = 200, description = "Subscription", body = SubscriptionResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_subscription(auth: Authenticated) -> Json<SubscriptionResponse> {
    let now = Utc::now();
    let sub = &auth.subscription;
    Json(SubscriptionResponse {
        plan: sub.plan,
        status: sub.status,
        current_period_end: sub.current_period_end,
        active: sub.is_active(now),
        features: sub.enabled_features(now),
    })
}

pub fn users_router(state: UsersState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(get_me, update_me))
        .routes(routes!(get_subscription))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new("marie@atelier.fr", "h", "Marie", "Curie", 14)
    }

    #[test]
    fn test_update_merges_and_clears() {
        let mut user = user();
        user.company.company_city = Some("Lyon".into());
        user.company.tva_number = Some("FR00123456789".into());

        let req = UpdateProfileRequest {
            company_name: Some(" Atelier Curie ".into()),
            company_city: Some("  ".into()),
            ..Default::default()
        };
        req.apply(&mut user).unwrap();

        assert_eq!(user.company.company_name.as_deref(), Some("Atelier Curie"));
        assert_eq!(user.company.company_city, None);
        // untouched
        assert_eq!(user.company.tva_number.as_deref(), Some("FR00123456789"));
        assert_eq!(user.first_name, "Marie");
    }

    #[test]
    fn test_update_rejects_bad_fields() {
        let mut user = user();
        let req = UpdateProfileRequest {
            first_name: Some("".into()),
            company_email: Some("pas-un-mail".into()),
            siret: Some("123".into()),
            ..Default::default()
        };
        let body = req.apply(&mut user).unwrap_err().to_api_error();
        let fields: Vec<_> = body.errors.unwrap().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["firstName", "companyEmail", "siret"]);
        assert_eq!(user.first_name, "Marie");
    }

    #[test]
    fn test_user_response_is_flat() {
        let mut user = user();
        user.company.siret = Some("12345678900011".into());
        let json = serde_json::to_value(UserResponse::from(&user)).unwrap();
        assert_eq!(json["siret"], "12345678900011");
        assert_eq!(json["plan"], "pro");
        assert!(json.get("passwordHash").is_none());
    }
}
