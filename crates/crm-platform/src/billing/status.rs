//! Document status lifecycles
//!
//! Devis and invoices move through explicit transition tables. Re-applying the
//! current status is accepted as a no-op.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::BillingError;

/// A status enum with a transition table.
pub trait StatusLifecycle: Copy + Eq + fmt::Debug + 'static {
    /// Request field the status is read from, used in error messages
    const FIELD: &'static str;

    fn all() -> &'static [Self];

    fn as_str(&self) -> &'static str;

    /// Statuses reachable from this one, excluding itself.
    fn allowed_next(&self) -> &'static [Self];

    /// Forward step the UI cycles through on a single click.
    fn next_in_cycle(&self) -> Self;

    fn can_transition_to(&self, target: Self) -> bool {
        *self == target || self.allowed_next().contains(&target)
    }

    /// Validate a transition, returning the target on success.
    fn transition_to(&self, target: Self) -> Result<Self, BillingError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(BillingError::InvalidTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }

    fn parse_status(value: &str) -> Result<Self, BillingError> {
        let wanted = value.trim();
        Self::all()
            .iter()
            .copied()
            .find(|s| s.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BillingError::InvalidStatus {
                field: Self::FIELD,
                value: value.to_string(),
                allowed: Self::all().iter().map(|s| s.as_str()).collect(),
            })
    }
}

/// Quote status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DevisStatus {
    Nouveau,
    EnAttente,
    Fini,
    Inactif,
}

impl Default for DevisStatus {
    fn default() -> Self {
        Self::Nouveau
    }
}

impl StatusLifecycle for DevisStatus {
    const FIELD: &'static str = "status";

    fn all() -> &'static [Self] {
        &[Self::Nouveau, Self::EnAttente, Self::Fini, Self::Inactif]
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Nouveau => "nouveau",
            Self::EnAttente => "en_attente",
            Self::Fini => "fini",
            Self::Inactif => "inactif",
        }
    }

    fn allowed_next(&self) -> &'static [Self] {
        match self {
            Self::Nouveau => &[Self::EnAttente, Self::Fini, Self::Inactif],
            Self::EnAttente => &[Self::Nouveau, Self::Fini, Self::Inactif],
            Self::Fini => &[Self::Inactif],
            Self::Inactif => &[Self::Nouveau],
        }
    }

    fn next_in_cycle(&self) -> Self {
        match self {
            Self::Nouveau => Self::EnAttente,
            Self::EnAttente => Self::Fini,
            Self::Fini => Self::Inactif,
            Self::Inactif => Self::Nouveau,
        }
    }
}

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Paid,
    Overdue,
    Canceled,
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl StatusLifecycle for InvoiceStatus {
    const FIELD: &'static str = "status";

    fn all() -> &'static [Self] {
        &[Self::Draft, Self::Pending, Self::Paid, Self::Overdue, Self::Canceled]
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Canceled => "canceled",
        }
    }

    fn allowed_next(&self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::Pending, Self::Canceled],
            Self::Pending => &[Self::Draft, Self::Paid, Self::Overdue, Self::Canceled],
            Self::Overdue => &[Self::Pending, Self::Paid, Self::Canceled],
            // a payment can bounce
            Self::Paid => &[Self::Overdue, Self::Canceled],
            Self::Canceled => &[Self::Draft],
        }
    }

    fn next_in_cycle(&self) -> Self {
        match self {
            Self::Draft => Self::Pending,
            Self::Pending => Self::Paid,
            Self::Paid => Self::Overdue,
            Self::Overdue => Self::Canceled,
            Self::Canceled => Self::Draft,
        }
    }
}

macro_rules! impl_status_text {
    ($($ty:ty),+) => {$(
        impl FromStr for $ty {
            type Err = BillingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty as StatusLifecycle>::parse_status(s)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    )+};
}

impl_status_text!(DevisStatus, InvoiceStatus);
