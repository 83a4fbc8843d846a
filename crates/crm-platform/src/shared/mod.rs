//! Shared infrastructure: errors, API helpers, ids, auth middleware,
//! indexes, health probes and outgoing mail.

pub mod api_common;
pub mod error;
pub mod health_api;
pub mod indexes;
pub mod mailer;
pub mod middleware;
pub mod tsid;

pub use error::{PlatformError, Result};
pub use tsid::TsidGenerator;
