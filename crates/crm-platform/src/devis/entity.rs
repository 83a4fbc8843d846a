//! Devis Entity
//!
//! A priced quote for one client. `amount` is always derived from the
//! stored line items.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::billing::{
    compute_total, round_cents, ClientSnapshot, DevisStatus, IssuerSnapshot, LineItem,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Devis {
    #[serde(rename = "_id")]
    pub id: String,

    pub user_id: String,

    pub client_id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_devis: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_validite: Option<NaiveDate>,

    #[serde(default)]
    pub line_items: Vec<LineItem>,

    #[serde(default)]
    pub status: DevisStatus,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub status_changed_at: DateTime<Utc>,

    /// TTC total in cents precision
    pub amount: Decimal,

    #[serde(flatten)]
    pub issuer: IssuerSnapshot,

    #[serde(flatten)]
    pub client: ClientSnapshot,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Devis {
    pub fn new(user_id: impl Into<String>, client_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: crate::TsidGenerator::generate(),
            user_id: user_id.into(),
            client_id: client_id.into(),
            title: title.into(),
            description: None,
            date_devis: None,
            date_validite: None,
            line_items: vec![],
            status: DevisStatus::Nouveau,
            status_changed_at: now,
            amount: Decimal::ZERO,
            issuer: IssuerSnapshot::default(),
            client: ClientSnapshot::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the lines and recompute `amount`.
    pub fn set_line_items(&mut self, items: Vec<LineItem>) {
        self.line_items = items;
        self.recompute_amount();
    }

    pub fn recompute_amount(&mut self) {
        self.amount = round_cents(compute_total(&self.line_items));
    }

    /// Returns whether the status actually changed.
    pub fn set_status(&mut self, status: DevisStatus) -> bool {
        if self.status == status {
            return false;
        }
        let now = Utc::now();
        self.status = status;
        self.status_changed_at = now;
        self.updated_at = now;
        true
    }
}
