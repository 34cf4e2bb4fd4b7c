//! Value objects shared by the catalog, cart and order aggregates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Partial map of attribute id to the chosen option value.
pub type AttributeSelection = BTreeMap<String, String>;

pub const DEFAULT_CURRENCY: &str = "USD";

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }

    /// Builds a variant SKU from the product stem and the chosen option values,
    /// e.g. `TEE` + `["m", "navy blue"]` -> `TEE-M-NAVY-BLUE`.
    pub fn for_variant(stem: &str, values: &[&str]) -> Result<Self, SkuError> {
        let mut parts = vec![stem.trim().to_string()];
        parts.extend(values.iter().map(|v| v.split_whitespace().collect::<Vec<_>>().join("-")));
        Self::new(parts.join("-"))
    }

    /// Random `SKU-XXXXXXXX` code for records created without one.
    pub fn generate() -> Self {
        Self(format!("SKU-{:08X}", rand::random::<u32>()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SkuError { Empty, TooLong }
impl std::error::Error for SkuError {}
impl fmt::Display for SkuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "SKU empty"), Self::TooLong => write!(f, "SKU too long") }
    }
}

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn usd(amount: Decimal) -> Self { Self::new(amount, DEFAULT_CURRENCY) }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }
}

impl Default for Money { fn default() -> Self { Self::zero(DEFAULT_CURRENCY) } }

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { CurrencyMismatch }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Currency mismatch") }
}

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 999;

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }

    /// Quantity for one cart line: at least 1 and at most [`MAX_LINE_QUANTITY`].
    pub fn for_line(value: u32) -> Result<Self, QuantityError> {
        match value {
            0 => Err(QuantityError::Zero),
            v if v > MAX_LINE_QUANTITY => Err(QuantityError::TooLarge),
            v => Ok(Self(v)),
        }
    }

    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
    pub fn exceeds_line_limit(&self) -> bool { self.0 > MAX_LINE_QUANTITY }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum QuantityError { Zero, TooLarge }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "quantity must be at least 1"),
            Self::TooLarge => write!(f, "quantity must be at most {MAX_LINE_QUANTITY}"),
        }
    }
}

/// Lowercase, ASCII-alphanumeric slug with runs of anything else collapsed to `-`.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for ch in value.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_sku() { let sku = Sku::new("prod-001").unwrap(); assert_eq!(sku.as_str(), "PROD-001"); }
    #[test]
    fn test_variant_sku() {
        let sku = Sku::for_variant("tee", &["m", "navy blue"]).unwrap();
        assert_eq!(sku.as_str(), "TEE-M-NAVY-BLUE");
    }
    #[test]
    fn test_generated_sku_is_valid() {
        let sku = Sku::generate();
        assert!(sku.as_str().starts_with("SKU-"));
        assert_eq!(sku.as_str().len(), 12);
    }
    #[test]
    fn test_money_add() {
        let a = Money::usd(Decimal::new(100, 0));
        let b = Money::usd(Decimal::new(50, 0));
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(150, 0));
        assert_eq!(a.add(&Money::zero("EUR")), Err(MoneyError::CurrencyMismatch));
    }
    #[test]
    fn test_line_quantity_bounds() {
        assert_eq!(Quantity::for_line(0), Err(QuantityError::Zero));
        assert_eq!(Quantity::for_line(MAX_LINE_QUANTITY).unwrap().value(), 999);
        assert_eq!(Quantity::for_line(1000), Err(QuantityError::TooLarge));
        assert_eq!(Quantity::new(u32::MAX).add(5).value(), u32::MAX);
        assert!(Quantity::new(998).add(2).exceeds_line_limit());
        assert_eq!(Quantity::new(3).subtract(4), None);
    }
    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Men's Shoes & Boots"), "men-s-shoes-boots");
        assert_eq!(slugify("  Summer  2024 "), "summer-2024");
        assert_eq!(slugify("---"), "");
    }
}
