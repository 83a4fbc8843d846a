//! Use Case Errors
//!
//! Categorized error types for use case failures. Messages are user-facing
//! (French); codes are stable identifiers for clients and logs.
//!
//! ```ignore
//! use crm_platform::usecase::UseCaseError;
//! use crm_platform::details;
//!
//! UseCaseError::validation_with_details(
//!     "INVALID_LINE_ITEMS",
//!     "Lignes de devis invalides",
//!     details! { "lineItems[0].unitPrice" => "Le prix unitaire doit être positif" },
//! );
//! ```

use std::collections::HashMap;

use crate::billing::BillingError;
use crate::shared::error::PlatformError;

/// Macro for creating error detail maps.
#[macro_export]
macro_rules! details {
    () => {
        std::collections::HashMap::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(
            map.insert($key.to_string(), serde_json::json!($value));
        )+
        map
    }};
}

/// Categorized error types for use case failures.
///
/// - `ValidationError` -> 400 Bad Request
/// - `Billing` -> 400 Bad Request
/// - `BusinessRuleViolation` -> 409 Conflict
/// - `NotFoundError` -> 404 Not Found
/// - `CommitError` -> 500 Internal Server Error
#[derive(Debug, Clone)]
pub enum UseCaseError {
    /// Input validation failed. `details` maps field paths to messages.
    ValidationError {
        code: String,
        message: String,
        details: HashMap<String, serde_json::Value>,
    },

    /// Entity state forbids the operation.
    BusinessRuleViolation {
        code: String,
        message: String,
        details: HashMap<String, serde_json::Value>,
    },

    /// Entity absent or owned by someone else. A `field` detail names the
    /// request field that referenced it.
    NotFoundError {
        code: String,
        message: String,
        details: HashMap<String, serde_json::Value>,
    },

    /// Invalid status, transition or discount.
    Billing(BillingError),

    /// Persistence failed.
    CommitError {
        code: String,
        message: String,
        details: HashMap<String, serde_json::Value>,
    },
}

impl UseCaseError {
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            code: code.into(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn validation_with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self::ValidationError {
            code: code.into(),
            message: message.into(),
            details,
        }
    }

    pub fn business_rule(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BusinessRuleViolation {
            code: code.into(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFoundError {
            code: code.into(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Not found, attributed to a request field.
    pub fn not_found_field(
        code: impl Into<String>,
        message: impl Into<String>,
        field: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self::NotFoundError {
            code: code.into(),
            message: message.into(),
            details: crate::details! { "field" => field.into(), "id" => id.into() },
        }
    }

    pub fn commit(message: impl Into<String>) -> Self {
        Self::CommitError {
            code: "COMMIT_FAILED".to_string(),
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::ValidationError { code, .. } => code,
            Self::BusinessRuleViolation { code, .. } => code,
            Self::NotFoundError { code, .. } => code,
            Self::Billing(BillingError::DiscountOutOfRange { .. }) => "INVALID_DISCOUNT",
            Self::Billing(BillingError::InvalidStatus { .. }) => "INVALID_STATUS",
            Self::Billing(BillingError::InvalidTransition { .. }) => "INVALID_TRANSITION",
            Self::Billing(BillingError::AmountOverflow) => "AMOUNT_OVERFLOW",
            Self::CommitError { code, .. } => code,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::ValidationError { message, .. }
            | Self::BusinessRuleViolation { message, .. }
            | Self::NotFoundError { message, .. }
            | Self::CommitError { message, .. } => message.clone(),
            Self::Billing(err) => err.to_string(),
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::ValidationError { .. } | Self::Billing(_) => 400,
            Self::BusinessRuleViolation { .. } => 409,
            Self::NotFoundError { .. } => 404,
            Self::CommitError { .. } => 500,
        }
    }
}

impl std::fmt::Display for UseCaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message())
    }
}

impl std::error::Error for UseCaseError {}

impl From<BillingError> for UseCaseError {
    fn from(err: BillingError) -> Self {
        Self::Billing(err)
    }
}

impl From<PlatformError> for UseCaseError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotFound { message, field } => Self::NotFoundError {
                code: "NOT_FOUND".to_string(),
                message,
                details: field.map(|f| crate::details! { "field" => f }).unwrap_or_default(),
            },
            PlatformError::Duplicate { field, message } => Self::ValidationError {
                code: "DUPLICATE".to_string(),
                message: message.clone(),
                details: crate::details! { field => message },
            },
            PlatformError::Validation { message, errors } => Self::ValidationError {
                code: "VALIDATION_ERROR".to_string(),
                message,
                details: errors
                    .into_iter()
                    .map(|e| (e.field, serde_json::Value::String(e.message)))
                    .collect(),
            },
            PlatformError::Conflict { message } => Self::business_rule("CONFLICT", message),
            PlatformError::Billing(err) => Self::Billing(err),
            other => Self::commit(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validation_error() {
        let err = UseCaseError::validation("EMAIL_REQUIRED", "L'e-mail est obligatoire");
        assert_eq!(err.code(), "EMAIL_REQUIRED");
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_not_found_field_details() {
        let err = UseCaseError::not_found_field("DEVIS_NOT_FOUND", "Devis introuvable", "devisIds[1]", "abc");
        assert_eq!(err.http_status_code(), 404);
        if let UseCaseError::NotFoundError { details, .. } = err {
            assert_eq!(details.get("field"), Some(&serde_json::json!("devisIds[1]")));
        } else {
            panic!("Expected NotFoundError");
        }
    }

    #[test]
    fn test_billing_error_codes() {
        let err: UseCaseError = BillingError::DiscountOutOfRange { value: dec!(-5) }.into();
        assert_eq!(err.code(), "INVALID_DISCOUNT");
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_details_macro_multiple() {
        let details: HashMap<String, serde_json::Value> = crate::details! {
            "email" => "user@example.com",
            "count" => 42,
        };
        assert_eq!(details.get("email"), Some(&serde_json::json!("user@example.com")));
        assert_eq!(details.get("count"), Some(&serde_json::json!(42)));
    }

    #[test]
    fn test_platform_duplicate_becomes_validation() {
        let err: UseCaseError = PlatformError::duplicate("invoiceNumber", "Ce numéro de facture existe déjà").into();
        assert_eq!(err.code(), "DUPLICATE");
        assert_eq!(err.http_status_code(), 400);
    }
}
