//! Authentication Service
//!
//! HS256 JWT issuance and validation.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::shared::error::{PlatformError, Result};
use crate::user::entity::User;

/// JWT Claims for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,

    pub email: String,

    pub iss: String,

    pub aud: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret
    pub secret_key: String,

    pub issuer: String,

    pub audience: String,

    pub access_token_expiry_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            issuer: "gestio".to_string(),
            audience: "gestio-app".to_string(),
            access_token_expiry_secs: 86400,
        }
    }
}

pub struct AuthService {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret_key.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret_key.as_bytes());

        info!(issuer = %config.issuer, "AuthService initialized with HS256");

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Generate an access token for a user
    pub fn generate_access_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.access_token_expiry_secs);

        let claims = AccessTokenClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| PlatformError::internal(format!("Failed to encode JWT: {}", e)))
    }

    /// Validate an access token and extract claims
    pub fn validate_token(&self, token: &str) -> Result<AccessTokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => PlatformError::TokenExpired,
                _ => PlatformError::InvalidToken { message: e.to_string() },
            })
    }

    pub fn token_lifetime_secs(&self) -> i64 {
        self.config.access_token_expiry_secs
    }
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(AuthConfig {
            secret_key: "test-secret".to_string(),
            ..AuthConfig::default()
        })
    }

    #[test]
    fn test_generate_and_validate_token() {
        let service = service();
        let user = User::new("marie@atelier.fr", "hash", "Marie", "Curie", 14);

        let token = service.generate_access_token(&user).unwrap();
        let claims = service.validate_token(&token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "marie@atelier.fr");
        assert_eq!(claims.iss, "gestio");
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let user = User::new("a@b.fr", "hash", "A", "B", 14);
        let token = service().generate_access_token(&user).unwrap();

        let other = AuthService::new(AuthConfig {
            secret_key: "another".to_string(),
            ..AuthConfig::default()
        });
        assert!(matches!(other.validate_token(&token), Err(PlatformError::InvalidToken { .. })));
    }

    #[test]
    fn test_expired_token() {
        let service = AuthService::new(AuthConfig {
            secret_key: "test-secret".to_string(),
            access_token_expiry_secs: -3600,
            ..AuthConfig::default()
        });
        let user = User::new("a@b.fr", "hash", "A", "B", 14);
        let token = service.generate_access_token(&user).unwrap();

        assert!(matches!(service.validate_token(&token), Err(PlatformError::TokenExpired)));
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("bearer abc123"), None);
        assert_eq!(extract_bearer_token("Basic abc123"), None);
    }
}
