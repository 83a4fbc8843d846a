//! Business Card Entity
//!
//! One card per account: an image, a QR code placement and the actions a
//! visitor sees after scanning it.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::shared::api_common::{non_blank, FieldErrors};
use crate::shared::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum QrPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl Default for QrPosition {
    fn default() -> Self {
        Self::BottomRight
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Offer a file
    Download,
    /// Show the lead form
    Form,
    /// Send the visitor elsewhere after `delay`
    Redirect,
    /// Link to a site
    Website,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,

    #[serde(default)]
    pub order: i32,

    /// Milliseconds before the action runs
    #[serde(default)]
    pub delay: i64,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_qr_size() -> u32 {
    120
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardConfig {
    #[serde(default = "default_true")]
    pub show_qr: bool,

    #[serde(default)]
    pub qr_position: QrPosition,

    /// Pixels
    #[serde(default = "default_qr_size")]
    pub qr_size: u32,

    #[serde(default)]
    pub actions: Vec<CardAction>,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            show_qr: true,
            qr_position: QrPosition::default(),
            qr_size: default_qr_size(),
            actions: vec![],
        }
    }
}

impl CardConfig {
    pub fn check(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.qr_size == 0 {
            errors.add("cardConfig.qrSize", "Taille de QR code invalide");
        }
        for (index, action) in self.actions.iter().enumerate() {
            let path = format!("cardConfig.actions[{}]", index);
            if action.delay < 0 {
                errors.add(format!("{}.delay", path), "Le délai ne peut pas être négatif");
            }
            let has = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
            match action.action_type {
                ActionType::Redirect | ActionType::Website if !has(&action.url) => {
                    errors.add(format!("{}.url", path), "Une URL est obligatoire");
                }
                ActionType::Download if !has(&action.file) => {
                    errors.add(format!("{}.file", path), "Un fichier est obligatoire");
                }
                _ => {}
            }
        }
        errors
    }

    pub fn validated(self) -> Result<Self> {
        self.check().finish()?;
        Ok(self)
    }

    /// Active actions in display order
    pub fn visible_actions(&self) -> Vec<CardAction> {
        let mut actions: Vec<CardAction> = self.actions.iter().filter(|a| a.active).cloned().collect();
        actions.sort_by_key(|a| a.order);
        actions
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardStats {
    #[serde(default)]
    pub total_views: i64,

    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional"
    )]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_viewed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub form_submissions: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessCard {
    #[serde(rename = "_id")]
    pub id: String,

    /// Unique: one card per account
    pub user_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_image: Option<String>,

    #[serde(default)]
    pub card_config: CardConfig,

    #[serde(default)]
    pub stats: CardStats,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl BusinessCard {
    pub fn new(user_id: impl Into<String>, card_image: Option<String>, card_config: CardConfig) -> Self {
        let now = Utc::now();
        Self {
            id: crate::TsidGenerator::generate(),
            user_id: user_id.into(),
            card_image: non_blank(card_image),
            card_config,
            stats: CardStats::default(),
            created_at: now,
            updated_at: now,
        }
    }
}
