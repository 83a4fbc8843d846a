//! Gestio Platform
//!
//! CRM backend for independent tradespeople:
//! - Client records with lead capture and CSV import
//! - Devis (quotes) and invoices with a shared billing engine
//! - Appointments against a catalog of services
//! - Public business card with scan tracking
//! - Per-user notifications, live over WebSocket, plus follow-up reminders
//!
//! ## Module Organization (Aggregate-based)
//!
//! Each aggregate contains:
//! - `entity` - Domain entities
//! - `repository` - Data access
//! - `api` - REST endpoints
//! - `operations` - Use case operations (where applicable)

// Core aggregates
pub mod user;
pub mod client;
pub mod devis;
pub mod invoice;
pub mod appointment;
pub mod service_catalog;
pub mod business_card;
pub mod notification;

// Pure money engine
pub mod billing;

// Authentication
pub mod auth;

// Shared infrastructure
pub mod shared;

// Cross-cutting concerns
pub mod usecase;

// Re-export common types from shared
pub use shared::error::{PlatformError, Result};
pub use shared::tsid::TsidGenerator;

// Re-export use case infrastructure
pub use usecase::{ExecutionContext, UseCaseError, UseCaseResult};
// Note: try_use_case! and details! are exported at crate root via #[macro_export]

// Re-export main entity types for convenience
pub use user::entity::{CompanyProfile, Feature, Plan, Subscription, SubscriptionStatus, User};
pub use client::entity::{Client, ClientSource, ClientStatus};
pub use devis::entity::Devis;
pub use invoice::entity::Invoice;
pub use appointment::entity::{Appointment, AppointmentStatus};
pub use service_catalog::entity::Service;
pub use business_card::entity::BusinessCard;
pub use notification::entity::{Notification, NotificationCategory, NotificationKind};
pub use billing::{DevisStatus, InvoiceStatus, LineItem, StatusLifecycle};

// Re-export repositories
pub use user::repository::{UserRepository, UserStore};
pub use client::repository::{ClientRepository, ClientStore};
pub use devis::repository::{DevisRepository, DevisStore};
pub use invoice::repository::{InvoiceRepository, InvoiceStore};
pub use appointment::repository::AppointmentRepository;
pub use service_catalog::repository::ServiceRepository;
pub use business_card::repository::BusinessCardRepository;
pub use notification::repository::{NotificationRepository, NotificationStore};

// Re-export services
pub use auth::auth_service::{AccessTokenClaims, AuthConfig, AuthService};
pub use auth::password_service::{Argon2Config, PasswordPolicy, PasswordService};
pub use notification::{NotificationHub, NotificationService, ReminderScanner};
pub use shared::mailer::{LogMailer, Mailer, OutgoingMail, SmtpMailer, SmtpSettings};

/// Routers and their states, as wired by the server
pub mod api {
    // Middleware
    pub use crate::shared::middleware::{AppState, AuthContext, AuthLayer, Authenticated};
    pub use crate::shared::api_common::SuccessResponse;

    // API state and router exports from each aggregate
    pub use crate::auth::auth_api::{auth_router, AuthState};
    pub use crate::user::api::{users_router, UsersState};
    pub use crate::client::api::{clients_router, ClientsState};
    pub use crate::devis::api::{devis_router, DevisState};
    pub use crate::invoice::api::{invoices_router, InvoicesState};
    pub use crate::appointment::api::{appointments_router, AppointmentsState};
    pub use crate::service_catalog::api::{services_router, ServicesState};
    pub use crate::business_card::api::{business_cards_router, BusinessCardsState};
    pub use crate::notification::api::{notifications_router, socket_router, NotificationsState};

    // Shared APIs
    pub use crate::shared::health_api::{health_router, HealthState};
}
