//! Totals engine
//!
//! All arithmetic is done on `Decimal`; rounding to cents happens once, on the
//! value that gets persisted or displayed.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;

use super::error::BillingError;
use super::line_item::LineItem;

/// Per-line amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTotals {
    pub ht: Decimal,
    pub tva: Decimal,
    pub ttc: Decimal,
}

/// Amounts of a line, or `None` when one of its numeric fields is malformed
/// or the line does not fit in a `Decimal`.
pub fn line_totals(item: &LineItem) -> Option<LineTotals> {
    let unit_price = item.unit_price.value()?;
    let quantity = item.quantity.value()?;
    let rate = item.tva_rate.value()?;

    let ht = unit_price.checked_mul(quantity)?;
    let tva = ht.checked_mul(rate)?.checked_div(Decimal::ONE_HUNDRED)?;
    let ttc = ht.checked_add(tva)?;
    Some(LineTotals { ht, tva, ttc })
}

/// Tax-inclusive total of a list of lines.
///
/// Malformed lines contribute zero, as does a line that would push the
/// running total out of range. An empty list totals zero.
pub fn compute_total(items: &[LineItem]) -> Decimal {
    items
        .iter()
        .filter_map(line_totals)
        .fold(Decimal::ZERO, |total, line| total.checked_add(line.ttc).unwrap_or(total))
}

/// Round to cents, half away from zero. The result always carries two
/// decimal places.
pub fn round_cents(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Amounts for one TVA rate.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaxBand {
    #[schema(value_type = String)]
    pub rate: Decimal,
    #[schema(value_type = String)]
    pub base_ht: Decimal,
    #[schema(value_type = String)]
    pub tva: Decimal,
}

/// Document totals as rendered on a devis or invoice, rounded to cents.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTotals {
    #[schema(value_type = String)]
    pub total_ht: Decimal,
    #[schema(value_type = String)]
    pub total_tva: Decimal,
    #[schema(value_type = String)]
    pub total_ttc: Decimal,
    /// Bands sorted by ascending rate
    pub bands: Vec<TaxBand>,
    /// Lines left out of the totals because a numeric field did not parse
    /// or their amounts overflowed
    pub skipped_lines: usize,
}

/// Full breakdown of a list of lines.
pub fn compute_totals(items: &[LineItem]) -> DocumentTotals {
    let mut bands: BTreeMap<Decimal, (Decimal, Decimal)> = BTreeMap::new();
    let mut total_ht = Decimal::ZERO;
    let mut total_tva = Decimal::ZERO;
    let mut total_ttc = Decimal::ZERO;
    let mut skipped_lines = 0;

    for item in items {
        let Some(line) = line_totals(item) else {
            skipped_lines += 1;
            continue;
        };
        // value() is Some here, line_totals already checked it
        let rate = item.tva_rate.value().unwrap_or_default().normalize();
        let (band_ht, band_tva) = bands.get(&rate).copied().unwrap_or_default();

        let sums = (
            total_ht.checked_add(line.ht),
            total_tva.checked_add(line.tva),
            total_ttc.checked_add(line.ttc),
            band_ht.checked_add(line.ht),
            band_tva.checked_add(line.tva),
        );
        let (Some(ht), Some(tva), Some(ttc), Some(b_ht), Some(b_tva)) = sums else {
            skipped_lines += 1;
            continue;
        };
        total_ht = ht;
        total_tva = tva;
        total_ttc = ttc;
        bands.insert(rate, (b_ht, b_tva));
    }

    DocumentTotals {
        total_ht: round_cents(total_ht),
        total_tva: round_cents(total_tva),
        total_ttc: round_cents(total_ttc),
        bands: bands
            .into_iter()
            .map(|(rate, (base_ht, tva))| TaxBand {
                rate,
                base_ht: round_cents(base_ht),
                tva: round_cents(tva),
            })
            .collect(),
        skipped_lines,
    }
}

/// Result of applying a document-level discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscountedTotals {
    #[schema(value_type = String)]
    pub discount_amount: Decimal,
    #[schema(value_type = String)]
    pub discounted_ht: Decimal,
    #[schema(value_type = String)]
    pub discounted_tax: Decimal,
    #[schema(value_type = String)]
    pub total: Decimal,
}

/// Apply a percentage discount to a document subtotal.
///
/// The discount is spread proportionally over the combined tax of every
/// band rather than recomputed band by band. Percentages outside
/// `[0, 100]` are rejected.
pub fn apply_discount(
    subtotal_ht: Decimal,
    subtotal_tax: Decimal,
    discount_percent: Decimal,
) -> Result<DiscountedTotals, BillingError> {
    if discount_percent < Decimal::ZERO || discount_percent > Decimal::ONE_HUNDRED {
        return Err(BillingError::DiscountOutOfRange { value: discount_percent });
    }

    let ratio = discount_percent / Decimal::ONE_HUNDRED;
    let discount_amount = subtotal_ht.checked_mul(ratio).ok_or(BillingError::AmountOverflow)?;
    let discounted_ht = subtotal_ht
        .checked_sub(discount_amount)
        .ok_or(BillingError::AmountOverflow)?;
    let discounted_tax = subtotal_tax
        .checked_mul(Decimal::ONE - ratio)
        .ok_or(BillingError::AmountOverflow)?;
    let total = discounted_ht
        .checked_add(discounted_tax)
        .ok_or(BillingError::AmountOverflow)?;

    Ok(DiscountedTotals {
        discount_amount,
        discounted_ht,
        discounted_tax,
        total,
    })
}

/// Discount applied to the unrounded line sums, each figure then rounded to cents.
pub fn discounted_totals(
    items: &[LineItem],
    discount_percent: Decimal,
) -> Result<DiscountedTotals, BillingError> {
    let (ht, tva) = items
        .iter()
        .filter_map(line_totals)
        .fold((Decimal::ZERO, Decimal::ZERO), |(ht, tva), line| {
            match (ht.checked_add(line.ht), tva.checked_add(line.tva)) {
                (Some(next_ht), Some(next_tva)) => (next_ht, next_tva),
                _ => (ht, tva),
            }
        });

    let exact = apply_discount(ht, tva, discount_percent)?;
    Ok(DiscountedTotals {
        discount_amount: round_cents(exact.discount_amount),
        discounted_ht: round_cents(exact.discounted_ht),
        discounted_tax: round_cents(exact.discounted_tax),
        total: round_cents(exact.total),
    })
}

/// Amount persisted on an invoice: line totals, then the discount, rounded to cents.
pub fn invoice_amount(items: &[LineItem], discount_percent: Decimal) -> Result<Decimal, BillingError> {
    Ok(discounted_totals(items, discount_percent)?.total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::line_item::Amount;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_single_line_total() {
        let items = vec![LineItem::new("Prestation", dec!(100), dec!(2), dec!(20))];
        assert_eq!(compute_total(&items), dec!(240.00));
    }

    #[test]
    fn test_malformed_line_contributes_zero() {
        let items: Vec<LineItem> = serde_json::from_value(json!([
            {"unitPrice": "abc", "quantity": 2, "tvaRate": 20}
        ]))
        .unwrap();
        assert_eq!(compute_total(&items), Decimal::ZERO);

        let items: Vec<LineItem> = serde_json::from_value(json!([
            {"unitPrice": "abc", "quantity": 2, "tvaRate": 20},
            {"unitPrice": 10, "quantity": 1, "tvaRate": "x"},
            {"unitPrice": "50", "quantity": "2", "tvaRate": "5,5"}
        ]))
        .unwrap();
        assert_eq!(compute_total(&items), dec!(105.5));
    }

    #[test]
    fn test_empty_input_is_zero() {
        assert_eq!(compute_total(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let items: Vec<LineItem> = serde_json::from_value(json!([
            {"unitPrice": 100, "quantity": 1}
        ]))
        .unwrap();
        // tvaRate missing: taxed at 0
        assert_eq!(compute_total(&items), dec!(100));
    }

    #[test]
    fn test_no_binary_float_drift() {
        let items: Vec<LineItem> = (0..10)
            .map(|_| LineItem::new("x", Amount::from_json(json!(0.1)), 1i64, 0i64))
            .collect();
        assert_eq!(compute_total(&items), dec!(1.0));
    }

    #[test]
    fn test_overflowing_line_counts_as_malformed() {
        let items: Vec<LineItem> = serde_json::from_value(json!([
            {"unitPrice": "79228162514264337593543950335", "quantity": 2, "tvaRate": 20},
            {"unitPrice": 10, "quantity": 1, "tvaRate": 0}
        ]))
        .unwrap();
        assert!(line_totals(&items[0]).is_none());
        assert_eq!(compute_total(&items), dec!(10));

        let totals = compute_totals(&items);
        assert_eq!(totals.skipped_lines, 1);
        assert_eq!(totals.total_ttc, dec!(10.00));
    }

    #[test]
    fn test_running_sum_overflow_skips_line() {
        let huge = Decimal::from_str_exact("50000000000000000000000000000").unwrap();
        let items = vec![
            LineItem::new("a", huge, dec!(1), dec!(0)),
            LineItem::new("b", huge, dec!(1), dec!(0)),
        ];
        assert_eq!(compute_total(&items), huge);

        let totals = compute_totals(&items);
        assert_eq!(totals.skipped_lines, 1);
        assert_eq!(totals.bands.len(), 1);

        assert!(invoice_amount(&items, dec!(0)).is_ok());
    }

    #[test]
    fn test_discount_total_overflow_is_an_error() {
        let huge = Decimal::from_str_exact("50000000000000000000000000000").unwrap();
        assert_eq!(
            apply_discount(huge, huge, dec!(0)),
            Err(BillingError::AmountOverflow)
        );
    }

    #[test]
    fn test_compute_totals_bands() {
        let items = vec![
            LineItem::new("a", dec!(100), dec!(1), dec!(20)),
            LineItem::new("b", dec!(50), dec!(2), dec!(20.0)),
            LineItem::new("c", dec!(10), dec!(1), dec!(5.5)),
            LineItem::new("d", Amount::from_json(json!("??")), dec!(1), dec!(20)),
        ];
        let totals = compute_totals(&items);

        assert_eq!(totals.total_ht, dec!(210));
        assert_eq!(totals.total_tva, dec!(40.55));
        assert_eq!(totals.total_ttc, dec!(250.55));
        assert_eq!(totals.skipped_lines, 1);
        assert_eq!(totals.bands.len(), 2);
        assert_eq!(totals.bands[0].rate, dec!(5.5));
        assert_eq!(totals.bands[1].base_ht, dec!(200));
        assert_eq!(totals.total_ttc, round_cents(compute_total(&items)));
    }

    #[test]
    fn test_apply_discount() {
        let result = apply_discount(dec!(1000), dec!(200), dec!(10)).unwrap();
        assert_eq!(result.discounted_ht, dec!(900));
        assert_eq!(result.discounted_tax, dec!(180));
        assert_eq!(result.total, dec!(1080));
        assert_eq!(result.discount_amount, dec!(100));
    }

    #[test]
    fn test_apply_discount_bounds() {
        assert!(apply_discount(dec!(100), dec!(20), dec!(0)).is_ok());
        assert_eq!(apply_discount(dec!(100), dec!(20), dec!(100)).unwrap().total, Decimal::ZERO);
        assert!(matches!(
            apply_discount(dec!(100), dec!(20), dec!(-1)),
            Err(BillingError::DiscountOutOfRange { .. })
        ));
        assert!(apply_discount(dec!(100), dec!(20), dec!(100.01)).is_err());
    }

    #[test]
    fn test_invoice_amount_rounds_once() {
        let items = vec![LineItem::new("x", dec!(33.333), dec!(1), dec!(20))];
        // 33.333 * 1.2 = 39.9996, 5% off = 37.99962
        assert_eq!(invoice_amount(&items, dec!(5)).unwrap(), dec!(38.00));
    }

    #[test]
    fn test_round_cents_midpoint() {
        assert_eq!(round_cents(dec!(0.125)), dec!(0.13));
        assert_eq!(round_cents(dec!(-0.125)), dec!(-0.13));
        assert_eq!(round_cents(dec!(2.004)), dec!(2.00));
    }

    mod reorder {
        use super::*;
        use proptest::prelude::*;

        fn arb_amount() -> impl Strategy<Value = Amount> {
            prop_oneof![
                8 => (0i64..1_000_000, 0u32..4).prop_map(|(m, s)| Amount::Value(Decimal::new(m, s))),
                1 => Just(Amount::Malformed(json!("n/a"))),
            ]
        }

        fn arb_item() -> impl Strategy<Value = LineItem> {
            (arb_amount(), arb_amount(), prop_oneof![Just(dec!(0)), Just(dec!(5.5)), Just(dec!(10)), Just(dec!(20))])
                .prop_map(|(price, qty, rate)| LineItem::new("line", price, qty, rate))
        }

        proptest! {
            #[test]
            fn total_is_independent_of_order(
                (items, shuffled) in prop::collection::vec(arb_item(), 0..20)
                    .prop_flat_map(|items| (Just(items.clone()), Just(items).prop_shuffle()))
            ) {
                prop_assert_eq!(compute_total(&items), compute_total(&shuffled));
                prop_assert_eq!(compute_totals(&items), compute_totals(&shuffled));
            }
        }
    }
}
