//! Password hashing with Argon2id.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use tracing::{debug, warn};

use crate::shared::api_common::FieldError;
use crate::shared::error::{PlatformError, Result};

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
        }
    }
}

impl PasswordPolicy {
    /// French message describing the first rule the password breaks.
    pub fn check(&self, password: &str) -> std::result::Result<(), String> {
        let len = password.chars().count();
        if len < self.min_length {
            return Err(format!(
                "Le mot de passe doit contenir au moins {} caractères",
                self.min_length
            ));
        }
        if len > self.max_length {
            return Err(format!(
                "Le mot de passe doit contenir au plus {} caractères",
                self.max_length
            ));
        }
        Ok(())
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone)]
pub struct Argon2Config {
    /// Memory cost in KiB
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_cost: 19456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl Argon2Config {
    /// Cheap parameters for tests
    pub fn testing() -> Self {
        Self {
            memory_cost: 4096,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

pub struct PasswordService {
    argon2: Argon2<'static>,
    policy: PasswordPolicy,
}

impl PasswordService {
    pub fn new(config: Argon2Config, policy: PasswordPolicy) -> Result<Self> {
        let params = Params::new(config.memory_cost, config.time_cost, config.parallelism, None)
            .map_err(|e| PlatformError::internal(format!("Invalid Argon2 params: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            policy,
        })
    }

    /// Validate against the policy without hashing
    pub fn validate_password(&self, password: &str) -> Result<()> {
        self.policy
            .check(password)
            .map_err(|message| PlatformError::invalid_fields(vec![FieldError::new("password", message)]))
    }

    /// Hash a password in PHC format. The policy is checked first.
    pub fn hash_password(&self, password: &str) -> Result<String> {
        self.validate_password(password)?;

        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PlatformError::internal(format!("Failed to hash password: {}", e)))?;

        Ok(hash.to_string())
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| PlatformError::internal(format!("Invalid password hash format: {}", e)))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => {
                debug!("Password verification successful");
                Ok(true)
            }
            Err(argon2::password_hash::Error::Password) => {
                warn!("Password verification failed: incorrect password");
                Ok(false)
            }
            Err(e) => Err(PlatformError::internal(format!("Password verification error: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PasswordService {
        PasswordService::new(Argon2Config::testing(), PasswordPolicy::default()).unwrap()
    }

    #[test]
    fn test_policy() {
        let policy = PasswordPolicy::default();
        assert!(policy.check("motdepasse").is_ok());
        assert!(policy.check("court").is_err());
        assert!(policy.check(&"x".repeat(129)).is_err());
        // counted in characters, not bytes
        assert!(policy.check("éééééééé").is_ok());
    }

    #[test]
    fn test_hash_and_verify() {
        let service = service();
        let hash = service.hash_password("testpassword123").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(service.verify_password("testpassword123", &hash).unwrap());
        assert!(!service.verify_password("wrongpassword", &hash).unwrap());
    }

    #[test]
    fn test_short_password_is_field_error() {
        let err = service().hash_password("abc").unwrap_err();
        let body = err.to_api_error();
        assert_eq!(body.errors.unwrap()[0].field, "password");
    }

    #[test]
    fn test_hash_uniqueness() {
        let service = service();
        let a = service.hash_password("samepassword").unwrap();
        let b = service.hash_password("samepassword").unwrap();
        assert_ne!(a, b);
    }
}
