//! Notifications
//!
//! Inbox persistence, per-user live rooms over WebSocket, and the periodic
//! follow-up reminders.

pub mod entity;
pub mod repository;
pub mod hub;
pub mod service;
pub mod reminders;
pub mod api;

pub use entity::{Notification, NotificationCategory, NotificationKind, NotificationResponse};
pub use repository::{NotificationRepository, NotificationStore};
pub use hub::NotificationHub;
pub use service::{Delivery, NotificationService};
pub use reminders::{collect_reminders, ReminderScanner};
pub use api::{notifications_router, socket_router, NotificationsState};
