//! Invoice Entity

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::billing::{
    invoice_amount, BillingError, ClientSnapshot, InvoiceStatus, IssuerSnapshot, LineItem,
};

/// `FAC-<year>-<seq>`, the sequence padded to three digits
pub fn format_invoice_number(year: i32, sequence: u64) -> String {
    format!("FAC-{}-{:03}", year, sequence)
}

/// Prefix shared by every generated number of `year`
pub fn invoice_number_prefix(year: i32) -> String {
    format!("FAC-{}-", year)
}

/// Sequence of a generated number of `year`, `None` for any other number
pub fn parse_invoice_sequence(number: &str, year: i32) -> Option<u64> {
    let digits = number.strip_prefix(&invoice_number_prefix(year))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(rename = "_id")]
    pub id: String,

    pub user_id: String,

    pub client_id: String,

    /// Devis this invoice bills
    #[serde(default)]
    pub devis_ids: Vec<String>,

    /// Unique system-wide
    pub invoice_number: String,

    #[serde(default)]
    pub line_items: Vec<LineItem>,

    /// Percentage in [0, 100]
    #[serde(default)]
    pub discount: Decimal,

    /// Default TVA rate shown on the form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub status: InvoiceStatus,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub status_changed_at: DateTime<Utc>,

    /// TTC after discount
    pub amount: Decimal,

    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional"
    )]
    pub sent_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub issuer: IssuerSnapshot,

    #[serde(flatten)]
    pub client: ClientSnapshot,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(
        user_id: impl Into<String>,
        client_id: impl Into<String>,
        invoice_number: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: crate::TsidGenerator::generate(),
            user_id: user_id.into(),
            client_id: client_id.into(),
            devis_ids: vec![],
            invoice_number: invoice_number.into(),
            line_items: vec![],
            discount: Decimal::ZERO,
            tax_rate: None,
            payment_terms: None,
            notes: None,
            issue_date: None,
            due_date: None,
            status: InvoiceStatus::Draft,
            status_changed_at: now,
            amount: Decimal::ZERO,
            sent_at: None,
            issuer: IssuerSnapshot::default(),
            client: ClientSnapshot::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set lines and discount together, recomputing `amount`.
    pub fn set_pricing(&mut self, items: Vec<LineItem>, discount: Decimal) -> Result<(), BillingError> {
        let amount = invoice_amount(&items, discount)?;
        self.line_items = items;
        self.discount = discount;
        self.amount = amount;
        Ok(())
    }

    pub fn recompute_amount(&mut self) -> Result<(), BillingError> {
        self.amount = invoice_amount(&self.line_items, self.discount)?;
        Ok(())
    }

    /// Returns whether the status actually changed.
    pub fn set_status(&mut self, status: InvoiceStatus) -> bool {
        if self.status == status {
            return false;
        }
        let now = Utc::now();
        self.status = status;
        self.status_changed_at = now;
        self.updated_at = now;
        true
    }

    /// Record a delivery. A draft becomes pending.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) {
        self.sent_at = Some(at);
        if self.status == InvoiceStatus::Draft {
            self.set_status(InvoiceStatus::Pending);
        }
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_invoice_number_format() {
        assert_eq!(format_invoice_number(2024, 7), "FAC-2024-007");
        assert_eq!(format_invoice_number(2024, 1234), "FAC-2024-1234");
        assert!(format_invoice_number(2025, 1).starts_with(&invoice_number_prefix(2025)));
    }

    #[test]
    fn test_parse_invoice_sequence() {
        assert_eq!(parse_invoice_sequence("FAC-2024-007", 2024), Some(7));
        assert_eq!(parse_invoice_sequence("FAC-2024-1234", 2024), Some(1234));
        assert_eq!(parse_invoice_sequence("FAC-2023-007", 2024), None);
        assert_eq!(parse_invoice_sequence("FAC-2024-7b", 2024), None);
        assert_eq!(parse_invoice_sequence("FAC-2024-", 2024), None);
        assert_eq!(parse_invoice_sequence("FAC-2024-+7", 2024), None);
    }

    #[test]
    fn test_pricing_applies_discount() {
        let mut invoice = Invoice::new("u1", "c1", "FAC-2024-001");
        invoice
            .set_pricing(vec![LineItem::new("Forfait", dec!(1000), 1, 20)], dec!(10))
            .unwrap();
        assert_eq!(invoice.amount, dec!(1080.00));
    }

    #[test]
    fn test_out_of_range_discount_leaves_invoice_untouched() {
        let mut invoice = Invoice::new("u1", "c1", "FAC-2024-001");
        invoice
            .set_pricing(vec![LineItem::new("Forfait", dec!(100), 1, 0)], dec!(0))
            .unwrap();

        let err = invoice.set_pricing(vec![], dec!(150)).unwrap_err();
        assert!(matches!(err, BillingError::DiscountOutOfRange { .. }));
        assert_eq!(invoice.line_items.len(), 1);
        assert_eq!(invoice.amount, dec!(100));
    }

    #[test]
    fn test_mark_sent_moves_draft_to_pending_only() {
        let mut invoice = Invoice::new("u1", "c1", "FAC-2024-001");
        invoice.mark_sent(Utc::now());
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert!(invoice.sent_at.is_some());

        invoice.set_status(InvoiceStatus::Paid);
        invoice.mark_sent(Utc::now());
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }

    #[test]
    fn test_bson_round_trip() {
        let mut invoice = Invoice::new("u1", "c1", "FAC-2024-001");
        invoice.devis_ids = vec!["d1".into(), "d2".into()];
        invoice
            .set_pricing(vec![LineItem::new("Forfait", dec!(99.99), 3, 20)], dec!(5))
            .unwrap();
        invoice.mark_sent(Utc::now());

        let doc = bson::to_document(&invoice).unwrap();
        assert_eq!(doc.get_str("invoiceNumber").unwrap(), "FAC-2024-001");
        assert_eq!(doc.get_str("status").unwrap(), "pending");

        let back: Invoice = bson::from_document(doc).unwrap();
        assert_eq!(back.devis_ids, invoice.devis_ids);
        assert_eq!(back.amount, invoice.amount);
        assert_eq!(back.line_items, invoice.line_items);
        assert!(back.sent_at.is_some());
    }
}
