//! User Entity
//!
//! An account owner. Every other document is scoped to a user id.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Starter,
    Pro,
}

/// Premium features gated by plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    BusinessCard,
    ClientImport,
    Invoices,
    Appointments,
}

impl Feature {
    /// French label used in 403 messages
    pub fn label(&self) -> &'static str {
        match self {
            Feature::BusinessCard => "la carte de visite",
            Feature::ClientImport => "l'import de clients",
            Feature::Invoices => "la facturation",
            Feature::Appointments => "les rendez-vous",
        }
    }
}

impl Plan {
    pub fn features(&self) -> &'static [Feature] {
        match self {
            Plan::Free => &[],
            Plan::Starter => &[Feature::Invoices, Feature::Appointments],
            Plan::Pro => &[
                Feature::BusinessCard,
                Feature::ClientImport,
                Feature::Invoices,
                Feature::Appointments,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub plan: Plan,
    pub status: SubscriptionStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub current_period_end: DateTime<Utc>,
}

impl Subscription {
    /// Pro trial starting at `now`
    pub fn trial(days: i64, now: DateTime<Utc>) -> Self {
        Self {
            plan: Plan::Pro,
            status: SubscriptionStatus::Trialing,
            current_period_end: now + Duration::days(days),
        }
    }

    /// Canceled subscriptions and lapsed periods grant nothing.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status != SubscriptionStatus::Canceled && now <= self.current_period_end
    }

    pub fn has_feature(&self, feature: Feature, now: DateTime<Utc>) -> bool {
        self.is_active(now) && self.plan.features().contains(&feature)
    }

    pub fn enabled_features(&self, now: DateTime<Utc>) -> Vec<Feature> {
        if self.is_active(now) {
            self.plan.features().to_vec()
        } else {
            vec![]
        }
    }
}

/// Company details printed on quotes and invoices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub siret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tva_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,

    /// Lower-cased, unique
    pub email: String,

    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,

    #[serde(flatten)]
    pub company: CompanyProfile,

    pub subscription: Subscription,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        email: impl AsRef<str>,
        password_hash: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        trial_days: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: crate::TsidGenerator::generate(),
            email: normalize_email(email.as_ref()),
            password_hash: password_hash.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            company: CompanyProfile::default(),
            subscription: Subscription::trial(trial_days, now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_company(mut self, company: CompanyProfile) -> Self {
        self.company = company;
        self
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_gets_pro_trial() {
        let user = User::new("  Marie@Atelier.FR ", "hash", "Marie", "Curie", 14);
        assert_eq!(user.email, "marie@atelier.fr");
        assert_eq!(user.subscription.plan, Plan::Pro);
        assert_eq!(user.subscription.status, SubscriptionStatus::Trialing);
        assert!(user.subscription.has_feature(Feature::BusinessCard, Utc::now()));
    }

    #[test]
    fn test_plan_features() {
        let now = Utc::now();
        let starter = Subscription {
            plan: Plan::Starter,
            status: SubscriptionStatus::Active,
            current_period_end: now + Duration::days(30),
        };
        assert!(starter.has_feature(Feature::Invoices, now));
        assert!(starter.has_feature(Feature::Appointments, now));
        assert!(!starter.has_feature(Feature::ClientImport, now));

        let free = Subscription { plan: Plan::Free, ..starter.clone() };
        assert!(free.enabled_features(now).is_empty());
    }

    #[test]
    fn test_lapsed_or_canceled_grants_nothing() {
        let now = Utc::now();
        let lapsed = Subscription::trial(14, now - Duration::days(15));
        assert!(!lapsed.is_active(now));
        assert!(!lapsed.has_feature(Feature::Invoices, now));

        let mut canceled = Subscription::trial(14, now);
        canceled.status = SubscriptionStatus::Canceled;
        assert!(canceled.enabled_features(now).is_empty());
    }

    #[test]
    fn test_company_fields_are_flat_in_bson() {
        let user = User::new("a@b.fr", "h", "A", "B", 14).with_company(CompanyProfile {
            company_name: Some("Atelier Curie".into()),
            siret: Some("12345678900011".into()),
            ..CompanyProfile::default()
        });
        let doc = bson::to_document(&user).unwrap();
        assert_eq!(doc.get_str("companyName").unwrap(), "Atelier Curie");
        assert_eq!(doc.get_str("_id").unwrap(), user.id);

        let back: User = bson::from_document(doc).unwrap();
        assert_eq!(back.company, user.company);
    }
}
