//! Client Entity
//!
//! A prospect or customer of the account owner.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::billing::StatusLifecycle;
use crate::shared::api_common::{is_valid_email, non_blank, FieldErrors};
use crate::shared::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Nouveau,
    EnAttente,
    Active,
    Inactive,
}

impl Default for ClientStatus {
    fn default() -> Self {
        Self::Nouveau
    }
}

// Any client status may follow any other.
impl StatusLifecycle for ClientStatus {
    const FIELD: &'static str = "status";

    fn all() -> &'static [Self] {
        &[Self::Nouveau, Self::EnAttente, Self::Active, Self::Inactive]
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Nouveau => "nouveau",
            Self::EnAttente => "en_attente",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    fn allowed_next(&self) -> &'static [Self] {
        match self {
            Self::Nouveau => &[Self::EnAttente, Self::Active, Self::Inactive],
            Self::EnAttente => &[Self::Nouveau, Self::Active, Self::Inactive],
            Self::Active => &[Self::Nouveau, Self::EnAttente, Self::Inactive],
            Self::Inactive => &[Self::Nouveau, Self::EnAttente, Self::Active],
        }
    }

    fn next_in_cycle(&self) -> Self {
        match self {
            Self::Nouveau => Self::EnAttente,
            Self::EnAttente => Self::Active,
            Self::Active => Self::Inactive,
            Self::Inactive => Self::Nouveau,
        }
    }
}

/// Where the client record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClientSource {
    Manual,
    Import,
    BusinessCard,
}

impl Default for ClientSource {
    fn default() -> Self {
        Self::Manual
    }
}

/// Editable client fields, as posted by forms and produced by the importer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientFields {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub company: Option<String>,
    pub notes: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
}

impl ClientFields {
    pub fn new(name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
            ..Self::default()
        }
    }

    /// Errors for every missing or malformed required field.
    pub fn check(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.require("name", &self.name, "Le nom est obligatoire");
        if self.email.trim().is_empty() {
            errors.add("email", "L'e-mail est obligatoire");
        } else if !is_valid_email(&self.email) {
            errors.add("email", "Adresse e-mail invalide");
        }
        errors.require("phone", &self.phone, "Le téléphone est obligatoire");
        errors
    }

    /// Trimmed copy, or a validation error listing the bad fields.
    pub fn validated(self) -> Result<Self> {
        self.check().finish()?;
        Ok(Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: self.phone.trim().to_string(),
            company: non_blank(self.company),
            notes: non_blank(self.notes),
            address: non_blank(self.address),
            postal_code: non_blank(self.postal_code),
            city: non_blank(self.city),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(rename = "_id")]
    pub id: String,

    /// Owning account
    pub user_id: String,

    pub name: String,
    pub email: String,
    pub phone: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default)]
    pub status: ClientStatus,

    #[serde(default)]
    pub source: ClientSource,

    /// Absent on records stored before status changes were tracked
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional"
    )]
    pub status_changed_at: Option<DateTime<Utc>>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// `fields` are expected to be validated already.
    pub fn new(user_id: impl Into<String>, fields: ClientFields, source: ClientSource) -> Self {
        let now = Utc::now();
        let mut client = Self {
            id: crate::TsidGenerator::generate(),
            user_id: user_id.into(),
            name: String::new(),
            email: String::new(),
            phone: String::new(),
            company: None,
            notes: None,
            address: None,
            postal_code: None,
            city: None,
            status: ClientStatus::Nouveau,
            source,
            status_changed_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        client.apply(fields);
        client.updated_at = now;
        client
    }

    /// Replace every editable field.
    pub fn apply(&mut self, fields: ClientFields) {
        self.name = fields.name;
        self.email = fields.email;
        self.phone = fields.phone;
        self.company = fields.company;
        self.notes = fields.notes;
        self.address = fields.address;
        self.postal_code = fields.postal_code;
        self.city = fields.city;
        self.updated_at = Utc::now();
    }

    pub fn set_status(&mut self, status: ClientStatus) {
        if self.status != status {
            let now = Utc::now();
            self.status = status;
            self.status_changed_at = Some(now);
            self.updated_at = now;
        }
    }

    /// When the current status was entered. Older records fall back to
    /// their last update.
    pub fn status_since(&self) -> DateTime<Utc> {
        self.status_changed_at.unwrap_or(self.updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_reports_every_field() {
        let fields = ClientFields {
            name: " ".into(),
            email: "jean.dupont".into(),
            ..ClientFields::default()
        };
        let body = fields.validated().unwrap_err().to_api_error();
        let names: Vec<_> = body.errors.unwrap().into_iter().map(|e| e.field).collect();
        assert_eq!(names, vec!["name", "email", "phone"]);
    }

    #[test]
    fn test_validated_trims() {
        let fields = ClientFields {
            company: Some("  ".into()),
            city: Some(" Nantes ".into()),
            ..ClientFields::new(" Jean Dupont ", "Jean@Dupont.FR ", "06 12 34 56 78")
        }
        .validated()
        .unwrap();

        assert_eq!(fields.name, "Jean Dupont");
        assert_eq!(fields.email, "jean@dupont.fr");
        assert_eq!(fields.company, None);
        assert_eq!(fields.city.as_deref(), Some("Nantes"));
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(ClientStatus::parse_status("en_attente").unwrap(), ClientStatus::EnAttente);
        assert!(ClientStatus::parse_status("archived").is_err());
        let client = Client::new("u1", ClientFields::new("A", "a@b.fr", "1"), ClientSource::BusinessCard);
        let doc = bson::to_document(&client).unwrap();
        assert_eq!(doc.get_str("status").unwrap(), "nouveau");
        assert_eq!(doc.get_str("source").unwrap(), "business_card");
        assert_eq!(doc.get_str("userId").unwrap(), "u1");
    }

    #[test]
    fn test_status_change_is_timestamped_but_edits_are_not() {
        let mut client = Client::new("u1", ClientFields::new("A", "a@b.fr", "1"), ClientSource::Manual);
        client.set_status(ClientStatus::EnAttente);
        let entered = client.status_since();

        client.apply(ClientFields::new("A B", "a@b.fr", "2"));
        assert_eq!(client.status_since(), entered);

        client.set_status(ClientStatus::EnAttente);
        assert_eq!(client.status_since(), entered);
    }

    #[test]
    fn test_legacy_record_falls_back_to_updated_at() {
        let mut client = Client::new("u1", ClientFields::new("A", "a@b.fr", "1"), ClientSource::Manual);
        client.status_changed_at = None;
        let doc = bson::to_document(&client).unwrap();
        assert!(!doc.contains_key("statusChangedAt"));

        let back: Client = bson::from_document(doc).unwrap();
        assert_eq!(back.status_since(), back.updated_at);
    }

    #[test]
    fn test_any_client_status_reachable() {
        for from in ClientStatus::all() {
            for to in ClientStatus::all() {
                assert!(from.can_transition_to(*to));
            }
        }
    }
}
