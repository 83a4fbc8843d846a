//! Authentication
//!
//! - `AuthService` - HS256 access tokens
//! - `PasswordService` - Argon2id hashing
//! - `auth_api` - register / login endpoints

pub mod auth_service;
pub mod password_service;
pub mod auth_api;

pub use auth_service::{AccessTokenClaims, AuthConfig, AuthService};
pub use password_service::{Argon2Config, PasswordPolicy, PasswordService};
pub use auth_api::{auth_router, AuthState};
