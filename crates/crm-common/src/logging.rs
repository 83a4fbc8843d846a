//! Structured Logging Configuration
//!
//! - JSON output for production (LOG_FORMAT=json)
//! - Human-readable output for development (default)
//!
//! # Usage
//!
//! ```rust,ignore
//! use crm_common::logging::init_logging;
//!
//! fn main() {
//!     init_logging("crm-server");
//!     tracing::info!(user_id = %id, "Devis created");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: "json" for JSON output, anything else for text (default: text)
//! - `RUST_LOG`: level filter (default: info),
//!   e.g. `RUST_LOG=crm_platform=debug,tower_http=info`

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Output format selected from `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Initialize logging for the given service.
///
/// Reads `LOG_FORMAT` to pick JSON or text output and `RUST_LOG` for
/// filtering (defaults to INFO).
pub fn init_logging(service_name: &str) {
    let log_format = LogFormat::from_env_value(&std::env::var("LOG_FORMAT").unwrap_or_default());
    let env_filter = default_filter();

    match log_format {
        LogFormat::Json => init_json_logging(env_filter),
        LogFormat::Text => init_text_logging(env_filter),
    }

    tracing::debug!(service = service_name, format = ?log_format, "Logging initialized");
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_json_logging(env_filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .flatten_event(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .init();
}

fn init_text_logging(env_filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(true),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::from_env_value("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(""), LogFormat::Text);
        assert_eq!(LogFormat::from_env_value("pretty"), LogFormat::Text);
    }

    #[test]
    fn test_env_filter_parsing() {
        let filter = default_filter();
        drop(filter);
    }
}
