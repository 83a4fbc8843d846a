//! Billing Errors

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BillingError {
    #[error("Discount must be between 0 and 100, got {value}")]
    DiscountOutOfRange { value: Decimal },

    #[error("Invalid value '{value}' for {field}, expected one of: {}", .allowed.join(", "))]
    InvalidStatus {
        field: &'static str,
        value: String,
        allowed: Vec<&'static str>,
    },

    #[error("Status transition {from} -> {to} is not allowed")]
    InvalidTransition { from: String, to: String },

    #[error("Amount exceeds the representable range")]
    AmountOverflow,
}
