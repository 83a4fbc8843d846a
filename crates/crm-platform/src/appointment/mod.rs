//! Appointments booked against clients and catalog services.

pub mod entity;
pub mod repository;
pub mod api;

pub use entity::{Appointment, AppointmentFields, AppointmentStatus};
pub use repository::AppointmentRepository;
pub use api::{appointments_router, AppointmentsState};
