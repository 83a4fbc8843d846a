//! Devis Aggregate
//!
//! Quotes with issuer and client snapshots, recomputed totals and a
//! status lifecycle.

pub mod entity;
pub mod repository;
pub mod operations;
pub mod api;

pub use entity::Devis;
pub use repository::{DevisRepository, DevisStore};
pub use operations::{ChangeDevisStatusUseCase, CreateDevisUseCase, DevisCommand, UpdateDevisUseCase};
pub use api::{devis_router, DevisState};
