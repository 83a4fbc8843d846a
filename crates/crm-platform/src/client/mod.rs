//! Client Aggregate
//!
//! Prospects and customers of an account, with CSV import and the public
//! business-card lead form.

pub mod entity;
pub mod repository;
pub mod import;
pub mod api;

pub use entity::{Client, ClientFields, ClientSource, ClientStatus};
pub use repository::{ClientRepository, ClientStore};
pub use api::{clients_router, ClientsState};
