//! User Aggregate
//!
//! Accounts, company profile and subscription.

pub mod entity;
pub mod repository;
pub mod api;

pub use entity::{CompanyProfile, Feature, Plan, Subscription, SubscriptionStatus, User};
pub use repository::{UserRepository, UserStore};
pub use api::{users_router, UsersState};
