//! Service catalog: the prestations an account offers for booking.

pub mod entity;
pub mod repository;
pub mod api;

pub use entity::{Service, ServiceFields};
pub use repository::ServiceRepository;
pub use api::{services_router, ServicesState};
