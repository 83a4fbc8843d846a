//! API Middleware
//!
//! `AuthLayer` puts the shared `AppState` into request extensions so the
//! `Authenticated` extractor can resolve the caller from a Bearer token.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    response::Response,
};
use chrono::Utc;
use tower::{Layer, Service};

use crate::auth::auth_service::{extract_bearer_token, AuthService};
use crate::shared::error::PlatformError;
use crate::user::entity::{Feature, Subscription, User};
use crate::user::repository::UserRepository;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub user_repo: Arc<UserRepository>,
}

impl AppState {
    /// Resolve a raw token to the caller.
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, PlatformError> {
        let claims = self.auth_service.validate_token(token)?;
        let user = self
            .user_repo
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| PlatformError::unauthorized("Compte introuvable"))?;
        Ok(AuthContext::from(&user))
    }
}

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,
    pub subscription: Subscription,
}

impl From<&User> for AuthContext {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            subscription: user.subscription.clone(),
        }
    }
}

impl AuthContext {
    /// 403 unless the caller's plan includes `feature`.
    pub fn require_feature(&self, feature: Feature) -> Result<(), PlatformError> {
        if self.subscription.has_feature(feature, Utc::now()) {
            Ok(())
        } else {
            Err(PlatformError::forbidden(format!(
                "Votre abonnement n'inclut pas {}",
                feature.label()
            )))
        }
    }
}

/// Authenticated user extractor
pub struct Authenticated(pub AuthContext);

impl std::ops::Deref for Authenticated {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = PlatformError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let app_state = parts
            .extensions
            .get::<AppState>()
            .cloned()
            .ok_or_else(|| PlatformError::internal("Auth service not configured"))?;

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer_token)
            .ok_or_else(|| PlatformError::unauthorized("Authentification requise"))?;

        let context = app_state.authenticate(token).await?;
        Ok(Authenticated(context))
    }
}

#[derive(Clone)]
pub struct AuthLayer {
    state: AppState,
}

impl AuthLayer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    state: AppState,
}

impl<S, B> Service<axum::http::Request<B>> for AuthMiddleware<S>
where
    S: Service<axum::http::Request<B>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: axum::http::Request<B>) -> Self::Future {
        req.extensions_mut().insert(self.state.clone());
        Box::pin(self.inner.call(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::entity::{Plan, SubscriptionStatus};

    #[test]
    fn test_require_feature() {
        let user = User::new("a@b.fr", "h", "A", "B", 14);
        let mut ctx = AuthContext::from(&user);
        assert!(ctx.require_feature(Feature::ClientImport).is_ok());

        ctx.subscription.plan = Plan::Starter;
        ctx.subscription.status = SubscriptionStatus::Active;
        let err = ctx.require_feature(Feature::ClientImport).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
        assert!(ctx.require_feature(Feature::Invoices).is_ok());
    }
}
