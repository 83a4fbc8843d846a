//! Platform Error Types
//!
//! Messages returned to callers are French; `Display` output is English and
//! only goes to logs (and to `details` on a 500).

use thiserror::Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response, Json},
};
use tracing::error;

use crate::billing::BillingError;
use crate::shared::api_common::{ApiError, FieldError};
use crate::usecase::UseCaseError;

#[derive(Error, Debug)]
pub enum PlatformError {
    /// Absent, or owned by another user
    #[error("Not found: {message}")]
    NotFound { message: String, field: Option<String> },

    #[error("Duplicate value for {field}")]
    Duplicate { field: String, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String, errors: Vec<FieldError> },

    #[error(transparent)]
    Billing(#[from] BillingError),

    /// A business rule blocks the operation
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Authorization error: {message}")]
    Unauthorized { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {message}")]
    InvalidToken { message: String },

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bson::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] bson::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mail error: {message}")]
    Mail { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlatformError {
    /// `label` is the French entity name shown to the user, e.g. "Client".
    pub fn not_found(label: &str, id: impl AsRef<str>) -> Self {
        tracing::debug!(entity = label, id = id.as_ref(), "Entity not found");
        Self::NotFound {
            message: format!("{} introuvable", label),
            field: None,
        }
    }

    /// Not found, attributed to the request field that referenced it.
    pub fn not_found_field(label: &str, field: impl Into<String>, id: impl AsRef<str>) -> Self {
        tracing::debug!(entity = label, id = id.as_ref(), "Referenced entity not found");
        Self::NotFound {
            message: format!("{} introuvable", label),
            field: Some(field.into()),
        }
    }

    pub fn duplicate(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Duplicate {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            errors: vec![],
        }
    }

    /// Field-level validation failure.
    pub fn invalid_fields(errors: Vec<FieldError>) -> Self {
        Self::Validation {
            message: "Données invalides".to_string(),
            errors,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PlatformError::NotFound { .. } => StatusCode::NOT_FOUND,
            PlatformError::Duplicate { .. }
            | PlatformError::Validation { .. }
            | PlatformError::Billing(_) => StatusCode::BAD_REQUEST,
            PlatformError::Conflict { .. } => StatusCode::CONFLICT,
            PlatformError::Unauthorized { .. }
            | PlatformError::InvalidCredentials
            | PlatformError::TokenExpired
            | PlatformError::InvalidToken { .. } => StatusCode::UNAUTHORIZED,
            PlatformError::Forbidden { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Response body for this error.
    pub fn to_api_error(&self) -> ApiError {
        let (code, message, errors) = match self {
            PlatformError::NotFound { message, field } => (
                "NOT_FOUND",
                message.clone(),
                field.as_ref().map(|f| vec![FieldError::new(f, message)]),
            ),
            PlatformError::Duplicate { field, message } => (
                "DUPLICATE",
                message.clone(),
                Some(vec![FieldError::new(field, message)]),
            ),
            PlatformError::Validation { message, errors } => (
                "VALIDATION_ERROR",
                message.clone(),
                (!errors.is_empty()).then(|| errors.clone()),
            ),
            PlatformError::Billing(err) => billing_error_body(err),
            PlatformError::Conflict { message } => ("CONFLICT", message.clone(), None),
            PlatformError::Unauthorized { message } => ("UNAUTHORIZED", message.clone(), None),
            PlatformError::InvalidCredentials => (
                "INVALID_CREDENTIALS",
                "E-mail ou mot de passe incorrect".to_string(),
                None,
            ),
            PlatformError::TokenExpired => ("TOKEN_EXPIRED", "Session expirée".to_string(), None),
            PlatformError::InvalidToken { .. } => ("INVALID_TOKEN", "Jeton invalide".to_string(), None),
            PlatformError::Forbidden { message } => ("FORBIDDEN", message.clone(), None),
            _ => ("INTERNAL_ERROR", "Erreur interne du serveur".to_string(), None),
        };

        let details = (self.status_code() == StatusCode::INTERNAL_SERVER_ERROR).then(|| self.to_string());

        ApiError {
            error: code.to_string(),
            message,
            errors,
            details,
        }
    }
}

fn billing_error_body(err: &BillingError) -> (&'static str, String, Option<Vec<FieldError>>) {
    match err {
        BillingError::DiscountOutOfRange { .. } => {
            let message = "La remise doit être comprise entre 0 et 100".to_string();
            ("VALIDATION_ERROR", message.clone(), Some(vec![FieldError::new("discount", message)]))
        }
        BillingError::InvalidStatus { field, allowed, .. } => {
            let message = format!("Statut invalide. Valeurs possibles : {}", allowed.join(", "));
            ("INVALID_STATUS", message.clone(), Some(vec![FieldError::new(*field, message)]))
        }
        BillingError::InvalidTransition { from, to } => (
            "INVALID_TRANSITION",
            format!("Passage du statut « {} » à « {} » impossible", from, to),
            None,
        ),
        BillingError::AmountOverflow => (
            "AMOUNT_OVERFLOW",
            "Montant trop élevé".to_string(),
            Some(vec![FieldError::new("lineItems", "Montant trop élevé")]),
        ),
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
        }

        (status, Json(self.to_api_error())).into_response()
    }
}

impl From<UseCaseError> for PlatformError {
    fn from(err: UseCaseError) -> Self {
        match err {
            UseCaseError::ValidationError { code, message, details } if code == "DUPLICATE" => {
                let field = details.into_keys().next().unwrap_or_default();
                PlatformError::Duplicate { field, message }
            }
            UseCaseError::ValidationError { message, details, .. } => {
                let errors = details
                    .into_iter()
                    .map(|(field, value)| {
                        let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                        FieldError::new(field, text)
                    })
                    .collect();
                PlatformError::Validation { message, errors }
            }
            UseCaseError::BusinessRuleViolation { message, .. } => PlatformError::Conflict { message },
            UseCaseError::NotFoundError { message, details, .. } => PlatformError::NotFound {
                message,
                field: details.get("field").and_then(|v| v.as_str()).map(str::to_string),
            },
            UseCaseError::Billing(err) => PlatformError::Billing(err),
            UseCaseError::CommitError { message, .. } => PlatformError::Internal { message },
        }
    }
}

/// Check if a MongoDB error is a duplicate key error (code 11000)
pub fn is_duplicate_key_error(error: &mongodb::error::Error) -> bool {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(write_error)) =
        error.kind.as_ref()
    {
        return write_error.code == 11000;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_codes() {
        assert_eq!(PlatformError::not_found("Client", "x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(PlatformError::duplicate("invoiceNumber", "dup").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(PlatformError::conflict("used").status_code(), StatusCode::CONFLICT);
        assert_eq!(PlatformError::forbidden("plan").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(PlatformError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(PlatformError::internal("boom").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_found_body_names_field() {
        let body = PlatformError::not_found_field("Client", "clientId", "abc").to_api_error();
        assert_eq!(body.error, "NOT_FOUND");
        assert_eq!(body.message, "Client introuvable");
        let errors = body.errors.unwrap();
        assert_eq!(errors[0].field, "clientId");
        assert!(body.details.is_none());
    }

    #[test]
    fn test_internal_error_carries_details() {
        let body = PlatformError::internal("socket closed").to_api_error();
        assert_eq!(body.message, "Erreur interne du serveur");
        assert_eq!(body.details.as_deref(), Some("Internal error: socket closed"));
    }

    #[test]
    fn test_billing_errors_are_bad_requests() {
        let err: PlatformError = BillingError::DiscountOutOfRange { value: dec!(120) }.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_api_error().errors.unwrap()[0].field, "discount");

        let err: PlatformError = "archived".parse::<crate::billing::DevisStatus>().unwrap_err().into();
        let body = err.to_api_error();
        assert_eq!(body.error, "INVALID_STATUS");
        assert!(body.message.contains("en_attente"));
    }

    #[test]
    fn test_duplicate_keeps_its_code_through_a_use_case() {
        let err: UseCaseError = PlatformError::duplicate("invoiceNumber", "Ce numéro existe déjà").into();
        assert_eq!(err.code(), "DUPLICATE");

        let err = PlatformError::from(err);
        assert!(matches!(&err, PlatformError::Duplicate { field, .. } if field == "invoiceNumber"));
        let body = err.to_api_error();
        assert_eq!(body.error, "DUPLICATE");
        assert_eq!(body.errors.unwrap()[0].field, "invoiceNumber");
    }

    #[test]
    fn test_use_case_validation_maps_details_to_fields() {
        let err: PlatformError = UseCaseError::validation_with_details(
            "INVALID_LINE_ITEMS",
            "Lignes invalides",
            crate::details! { "lineItems[0].unitPrice" => "Le prix doit être positif" },
        )
        .into();

        let body = err.to_api_error();
        assert_eq!(body.message, "Lignes invalides");
        let errors = body.errors.unwrap();
        assert_eq!(errors[0].field, "lineItems[0].unitPrice");
        assert_eq!(errors[0].message, "Le prix doit être positif");
    }
}
