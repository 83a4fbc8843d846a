//! Line items and lenient numeric fields.
//!
//! Quote forms post numbers, numeric strings ("12,50", "1 200") or garbage.
//! An [`Amount`] keeps whatever it could not parse so the stored document
//! round-trips unchanged, and the totals engine skips such lines.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use utoipa::ToSchema;

/// A numeric form field.
#[derive(Debug, Clone, PartialEq)]
pub enum Amount {
    /// Parsed value. Missing, null and blank inputs become zero.
    Value(Decimal),
    /// Input that is not a number, kept verbatim.
    Malformed(Value),
}

impl Amount {
    pub fn zero() -> Self {
        Amount::Value(Decimal::ZERO)
    }

    /// The numeric value, or `None` when the input did not parse.
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Amount::Value(d) => Some(*d),
            Amount::Malformed(_) => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Amount::Malformed(_))
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, Amount::Value(d) if d.is_sign_negative() && !d.is_zero())
    }

    /// Interpret an arbitrary JSON/BSON value.
    pub fn from_json(raw: Value) -> Self {
        match raw {
            Value::Null => Amount::zero(),
            Value::Number(ref n) => {
                if let Some(i) = n.as_i64() {
                    return Amount::Value(Decimal::from(i));
                }
                if let Some(u) = n.as_u64() {
                    return Amount::Value(Decimal::from(u));
                }
                parse_decimal(&n.to_string())
                    .map(Amount::Value)
                    .unwrap_or(Amount::Malformed(raw))
            }
            Value::String(ref s) => Self::parse_text(s).unwrap_or(Amount::Malformed(raw)),
            other => Amount::Malformed(other),
        }
    }

    /// Parse user text. Accepts a comma decimal separator and digit-group spaces.
    fn parse_text(text: &str) -> Option<Self> {
        let cleaned: String = text
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}'))
            .map(|c| if c == ',' { '.' } else { c })
            .collect();

        if cleaned.is_empty() {
            return Some(Amount::zero());
        }
        parse_decimal(&cleaned).map(Amount::Value)
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

impl Default for Amount {
    fn default() -> Self {
        Amount::zero()
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::Value(value)
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount::Value(Decimal::from(value))
    }
}

impl From<i32> for Amount {
    fn from(value: i32) -> Self {
        Amount::Value(Decimal::from(value))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Amount::Value(d) => Serialize::serialize(d, serializer),
            Amount::Malformed(raw) => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Amount::from_json(raw))
    }
}

/// One priced line of a devis or invoice.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub description: String,

    /// Unit price excluding tax
    #[serde(default)]
    #[schema(value_type = String, example = "100.00")]
    pub unit_price: Amount,

    #[serde(default)]
    #[schema(value_type = String, example = "2")]
    pub quantity: Amount,

    /// Unit label (h, jour, pièce, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// TVA percentage, e.g. 20 or 5.5
    #[serde(default)]
    #[schema(value_type = String, example = "20")]
    pub tva_rate: Amount,
}

impl LineItem {
    pub fn new(
        description: impl Into<String>,
        unit_price: impl Into<Amount>,
        quantity: impl Into<Amount>,
        tva_rate: impl Into<Amount>,
    ) -> Self {
        Self {
            description: description.into(),
            unit_price: unit_price.into(),
            quantity: quantity.into(),
            unit: None,
            tva_rate: tva_rate.into(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// True when any numeric field failed to parse.
    pub fn is_malformed(&self) -> bool {
        self.unit_price.is_malformed() || self.quantity.is_malformed() || self.tva_rate.is_malformed()
    }
}

/// Deserialize a `lineItems` field that may be absent, null, not an array,
/// or contain non-object entries. Anything unusable is dropped.
pub fn deserialize_line_items<'de, D>(deserializer: D) -> Result<Option<Vec<LineItem>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Array(entries)) => Some(
            entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value::<LineItem>(entry).ok())
                .collect(),
        ),
        _ => None,
    })
}
