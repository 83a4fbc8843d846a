//! Gestio Configuration System
//!
//! TOML-based configuration with environment variable override support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub mongodb: MongoConfig,
    pub auth: AuthConfig,
    pub mail: MailConfig,
    pub reminders: ReminderConfig,

    /// Enable development mode
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            mongodb: MongoConfig::default(),
            auth: AuthConfig::default(),
            mail: MailConfig::default(),
            reminders: ReminderConfig::default(),
            dev_mode: false,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

/// MongoDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "gestio".to_string(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: String,
    pub issuer: String,
    pub access_token_expiry_secs: i64,
    /// Length of the trial granted to new accounts
    pub trial_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: "gestio".to_string(),
            access_token_expiry_secs: 86400, // 24 hours
            trial_days: 14,
        }
    }
}

/// Outgoing mail configuration. Mail is logged instead of sent when `smtp_host` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from_address: "no-reply@gestio.local".to_string(),
        }
    }
}

impl MailConfig {
    pub fn is_enabled(&self) -> bool {
        !self.smtp_host.trim().is_empty()
    }
}

/// Advisory reminder scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// A prospect waiting longer than this is reported
    pub stale_client_days: i64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            stale_client_days: 7,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Check settings the server cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() && !self.dev_mode {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret must be set outside dev mode".to_string(),
            ));
        }
        if self.reminders.enabled && self.reminders.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "reminders.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.auth.access_token_expiry_secs <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.access_token_expiry_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Gestio Configuration
# Environment variables (CRM_*) override these settings

dev_mode = false

[http]
port = 8080
host = "0.0.0.0"
cors_origins = ["http://localhost:5173"]

[mongodb]
uri = "mongodb://localhost:27017"
database = "gestio"

[auth]
jwt_secret = ""
issuer = "gestio"
access_token_expiry_secs = 86400
trial_days = 14

[mail]
smtp_host = ""
smtp_port = 587
username = ""
password = ""
from_address = "no-reply@gestio.local"

[reminders]
enabled = true
interval_secs = 3600
stale_client_days = 7
"#
        .to_string()
    }
}
