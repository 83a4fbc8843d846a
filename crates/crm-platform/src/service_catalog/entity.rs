//! Service Entity
//!
//! A bookable prestation with a duration, a price and a calendar colour.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::billing::Amount;
use crate::shared::api_common::{non_blank, FieldErrors};
use crate::shared::error::Result;

pub const DEFAULT_COLOR: &str = "#3B82F6";

/// Longest bookable duration, in minutes: 31 days
pub const MAX_DURATION_MINUTES: i64 = 24 * 60 * 31;

fn is_hex_color(value: &str) -> bool {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("valid regex"))
        .is_match(value)
}

/// Service form body
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFields {
    #[serde(default)]
    pub name: String,

    /// Minutes
    #[serde(default)]
    pub duration: i64,

    #[serde(default)]
    #[schema(value_type = String, example = "45.00")]
    pub price: Amount,

    /// `#RGB` or `#RRGGBB`
    pub color: Option<String>,

    pub description: Option<String>,
}

/// Checked [`ServiceFields`]
#[derive(Debug, Clone, PartialEq)]
pub struct ValidService {
    pub name: String,
    pub duration: i64,
    pub price: Decimal,
    pub color: String,
    pub description: Option<String>,
}

impl ServiceFields {
    pub fn validated(self) -> Result<ValidService> {
        let mut errors = FieldErrors::new();
        errors.require("name", &self.name, "Le nom est obligatoire");
        if self.duration <= 0 {
            errors.add("duration", "La durée doit être positive");
        } else if self.duration > MAX_DURATION_MINUTES {
            errors.add("duration", "La durée ne peut pas dépasser 31 jours");
        }
        match self.price.value() {
            None => errors.add("price", "Prix invalide"),
            Some(p) if p < Decimal::ZERO => errors.add("price", "Le prix ne peut pas être négatif"),
            Some(_) => {}
        }
        let color = non_blank(self.color).unwrap_or_else(|| DEFAULT_COLOR.to_string());
        if !is_hex_color(&color) {
            errors.add("color", "Couleur invalide");
        }
        errors.finish()?;

        Ok(ValidService {
            name: self.name.trim().to_string(),
            duration: self.duration,
            price: self.price.value().unwrap_or_default(),
            color,
            description: non_blank(self.description),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(rename = "_id")]
    pub id: String,

    pub user_id: String,

    pub name: String,

    /// Minutes
    pub duration: i64,

    pub price: Decimal,

    pub color: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn new(user_id: impl Into<String>, fields: ValidService) -> Self {
        let now = Utc::now();
        Self {
            id: crate::TsidGenerator::generate(),
            user_id: user_id.into(),
            name: fields.name,
            duration: fields.duration,
            price: fields.price,
            color: fields.color,
            description: fields.description,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, fields: ValidService) {
        self.name = fields.name;
        self.duration = fields.duration;
        self.price = fields.price;
        self.color = fields.color;
        self.description = fields.description;
        self.updated_at = Utc::now();
    }
}
