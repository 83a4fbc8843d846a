//! Notification Entity
//!
//! One inbox entry. The same payload is pushed to the user's live room.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Client,
    Devis,
    Invoice,
    Appointment,
    BusinessCard,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,

    pub user_id: String,

    #[serde(rename = "type")]
    pub kind: NotificationKind,

    pub category: NotificationCategory,

    pub title: String,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date: DateTime<Utc>,

    #[serde(default)]
    pub read: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,

    /// At most one entry per user and key. Never stored as null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,

    /// Set when a keyed entry is removed from the inbox; the row stays so
    /// its key remains used.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional"
    )]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationKind,
        category: NotificationCategory,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: crate::TsidGenerator::generate(),
            user_id: user_id.into(),
            kind,
            category,
            title: title.into(),
            message: message.into(),
            details: None,
            date: Utc::now(),
            read: false,
            client_id: None,
            devis_id: None,
            invoice_id: None,
            appointment_id: None,
            dedup_key: None,
            deleted_at: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_devis(mut self, devis_id: impl Into<String>) -> Self {
        self.devis_id = Some(devis_id.into());
        self
    }

    pub fn with_invoice(mut self, invoice_id: impl Into<String>) -> Self {
        self.invoice_id = Some(invoice_id.into());
        self
    }

    pub fn with_appointment(mut self, appointment_id: impl Into<String>) -> Self {
        self.appointment_id = Some(appointment_id.into());
        self
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    pub fn at(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }
}

/// Notification as sent over HTTP and the socket
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub date: DateTime<Utc>,
    pub read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devis_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
}

impl From<&Notification> for NotificationResponse {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id.clone(),
            kind: n.kind,
            category: n.category,
            title: n.title.clone(),
            message: n.message.clone(),
            details: n.details.clone(),
            date: n.date,
            read: n.read,
            client_id: n.client_id.clone(),
            devis_id: n.devis_id.clone(),
            invoice_id: n.invoice_id.clone(),
            appointment_id: n.appointment_id.clone(),
        }
    }
}
