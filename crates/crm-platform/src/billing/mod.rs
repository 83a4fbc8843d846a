//! Billing
//!
//! Monetary engine shared by devis and invoices: lenient line items,
//! totals, discounts, status lifecycles and party snapshots. Everything here
//! is pure.

pub mod error;
pub mod line_item;
pub mod party;
pub mod status;
pub mod totals;

pub use error::BillingError;
pub use line_item::{deserialize_line_items, Amount, LineItem};
pub use party::{ClientSnapshot, IssuerSnapshot};
pub use status::{DevisStatus, InvoiceStatus, StatusLifecycle};
pub use totals::{
    apply_discount, compute_total, compute_totals, discounted_totals, invoice_amount, line_totals,
    round_cents, DiscountedTotals, DocumentTotals, LineTotals, TaxBand,
};
