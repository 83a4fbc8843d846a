//! Gestio Common
//!
//! Cross-crate utilities shared by the server binary and the platform crate.

pub mod logging;

pub use logging::init_logging;
