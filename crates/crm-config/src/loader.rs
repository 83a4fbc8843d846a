//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "gestio.toml",
    "./config/config.toml",
    "/etc/gestio/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok());

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("CRM_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `CRM_*` overrides read through `lookup`. Unparseable numbers are ignored.
fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // HTTP
    if let Some(port) = lookup("CRM_HTTP_PORT").and_then(|v| v.parse().ok()) {
        config.http.port = port;
    }
    if let Some(val) = lookup("CRM_HTTP_HOST") {
        config.http.host = val;
    }
    if let Some(val) = lookup("CRM_CORS_ORIGINS") {
        config.http.cors_origins = val.split(',').map(|s| s.trim().to_string()).collect();
    }

    // MongoDB
    if let Some(val) = lookup("CRM_MONGODB_URI") {
        config.mongodb.uri = val;
    }
    if let Some(val) = lookup("CRM_MONGODB_DATABASE") {
        config.mongodb.database = val;
    }

    // Auth
    if let Some(val) = lookup("CRM_JWT_SECRET") {
        config.auth.jwt_secret = val;
    }
    if let Some(val) = lookup("CRM_JWT_ISSUER") {
        config.auth.issuer = val;
    }
    if let Some(secs) = lookup("CRM_ACCESS_TOKEN_EXPIRY_SECS").and_then(|v| v.parse().ok()) {
        config.auth.access_token_expiry_secs = secs;
    }
    if let Some(days) = lookup("CRM_TRIAL_DAYS").and_then(|v| v.parse().ok()) {
        config.auth.trial_days = days;
    }

    // Mail
    if let Some(val) = lookup("CRM_SMTP_HOST") {
        config.mail.smtp_host = val;
    }
    if let Some(port) = lookup("CRM_SMTP_PORT").and_then(|v| v.parse().ok()) {
        config.mail.smtp_port = port;
    }
    if let Some(val) = lookup("CRM_SMTP_USERNAME") {
        config.mail.username = val;
    }
    if let Some(val) = lookup("CRM_SMTP_PASSWORD") {
        config.mail.password = val;
    }
    if let Some(val) = lookup("CRM_MAIL_FROM") {
        config.mail.from_address = val;
    }

    // Reminders
    if let Some(val) = lookup("CRM_REMINDERS_ENABLED") {
        config.reminders.enabled = val.parse().unwrap_or(true);
    }
    if let Some(secs) = lookup("CRM_REMINDERS_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
        config.reminders.interval_secs = secs;
    }
    if let Some(days) = lookup("CRM_STALE_CLIENT_DAYS").and_then(|v| v.parse().ok()) {
        config.reminders.stale_client_days = days;
    }

    // General
    if let Some(val) = lookup("CRM_DEV_MODE") {
        config.dev_mode = val == "true" || val == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        apply_overrides(&mut config, lookup_from(&[
            ("CRM_HTTP_PORT", "3000"),
            ("CRM_MONGODB_URI", "mongodb://db:27017"),
            ("CRM_JWT_SECRET", "secret"),
            ("CRM_CORS_ORIGINS", "http://a.test, http://b.test"),
            ("CRM_DEV_MODE", "1"),
        ]));

        assert_eq!(config.http.port, 3000);
        assert_eq!(config.mongodb.uri, "mongodb://db:27017");
        assert_eq!(config.auth.jwt_secret, "secret");
        assert_eq!(config.http.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert!(config.dev_mode);
    }

    #[test]
    fn test_unparseable_numbers_are_ignored() {
        let mut config = AppConfig::default();
        apply_overrides(&mut config, lookup_from(&[
            ("CRM_HTTP_PORT", "not-a-port"),
            ("CRM_REMINDERS_INTERVAL_SECS", "-5"),
        ]));

        assert_eq!(config.http.port, 8080);
        assert_eq!(config.reminders.interval_secs, 3600);
    }

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[mongodb]\ndatabase = \"custom\"\n").unwrap();

        let loader = ConfigLoader::with_path(&path);
        assert_eq!(loader.find_config_file(), Some(path));
    }
}
