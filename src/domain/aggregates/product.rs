//! Product Aggregate
//!
//! A product is stored in one of two shapes. Legacy records are flat (one
//! price, an in-stock flag, optional size/color lists); enhanced records carry
//! declared attributes and priced, stocked variants. [`Product`] exposes a
//! single read API over both so callers never branch on the shape.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;
use crate::domain::value_objects::{slugify, AttributeSelection, Sku};

/// Inventory assigned to each migrated variant when a legacy record is only
/// flagged in stock and carries no quantity.
pub const MIGRATED_DEFAULT_STOCK: u32 = 100;

const MAX_RATING: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub rating: Decimal,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub featured: bool,
    #[serde(flatten)]
    pub details: ProductDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ProductDetails {
    Legacy(LegacyDetails),
    Enhanced(EnhancedDetails),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacyDetails {
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sizes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub colors: Vec<String>,
}

fn default_in_stock() -> bool { true }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnhancedDetails {
    pub base_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
    #[serde(default)]
    pub base_stock: u32,
    #[serde(default)]
    pub attributes: Vec<ProductAttribute>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAttribute {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: AttributeKind,
    pub options: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind { Size, Color, Material, Style, #[default] Custom }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: String,
    pub sku: Sku,
    pub attributes: AttributeSelection,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
    #[serde(default)]
    pub inventory: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ProductVariant {
    /// True when every selected pair is present in this variant's attributes.
    pub fn matches(&self, selection: &AttributeSelection) -> bool {
        selection.iter().all(|(attr, value)| self.attributes.get(attr) == Some(value))
    }
}

impl Product {
    pub fn create(name: impl Into<String>, category: impl Into<String>, details: ProductDetails) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.into(), description: String::new(), category: category.into(),
            subcategory: None, images: vec![], rating: Decimal::ZERO, review_count: 0, featured: false,
            details, created_at: now, updated_at: now,
        }
    }

    pub fn is_legacy(&self) -> bool { matches!(self.details, ProductDetails::Legacy(_)) }
    pub fn is_enhanced(&self) -> bool { matches!(self.details, ProductDetails::Enhanced(_)) }

    pub fn base_price(&self) -> Decimal {
        match &self.details {
            ProductDetails::Legacy(l) => l.price,
            ProductDetails::Enhanced(e) => e.base_price,
        }
    }

    pub fn variants(&self) -> &[ProductVariant] {
        match &self.details {
            ProductDetails::Legacy(_) => &[],
            ProductDetails::Enhanced(e) => &e.variants,
        }
    }

    pub fn variant(&self, variant_id: &str) -> Option<&ProductVariant> {
        self.variants().iter().find(|v| v.id == variant_id)
    }

    /// First variant, in declaration order, whose attributes contain the whole
    /// selection. An empty selection matches nothing.
    pub fn matching_variant(&self, selection: &AttributeSelection) -> Option<&ProductVariant> {
        if selection.is_empty() { return None; }
        self.variants().iter().find(|v| v.matches(selection))
    }

    /// Variant to display for a selection: the match, else the first variant.
    pub fn resolve_variant(&self, selection: &AttributeSelection) -> Option<&ProductVariant> {
        self.matching_variant(selection).or_else(|| self.variants().first())
    }

    pub fn current_price(&self, selection: &AttributeSelection) -> Decimal {
        self.matching_variant(selection).map_or_else(|| self.base_price(), |v| v.price)
    }

    pub fn original_price(&self, selection: &AttributeSelection) -> Option<Decimal> {
        if let Some(v) = self.matching_variant(selection) {
            if v.original_price.is_some() { return v.original_price; }
        }
        match &self.details {
            ProductDetails::Legacy(l) => l.original_price,
            ProductDetails::Enhanced(e) => e.original_price,
        }
    }

    /// Units available for a selection. `None` means the record does not track
    /// a quantity (legacy products flagged in stock without a count).
    pub fn available_quantity(&self, selection: &AttributeSelection) -> Option<u32> {
        if let Some(v) = self.matching_variant(selection) { return Some(v.inventory); }
        match &self.details {
            ProductDetails::Legacy(l) if !l.in_stock => Some(0),
            ProductDetails::Legacy(l) => l.stock_quantity,
            ProductDetails::Enhanced(e) => Some(e.base_stock),
        }
    }

    pub fn is_in_stock(&self, selection: &AttributeSelection) -> bool {
        if let Some(v) = self.matching_variant(selection) { return v.inventory > 0; }
        match &self.details {
            ProductDetails::Legacy(l) => l.in_stock && l.stock_quantity != Some(0),
            ProductDetails::Enhanced(e) => e.base_stock > 0 || e.variants.iter().any(|v| v.inventory > 0),
        }
    }

    /// Lowest and highest price across the base price and every variant.
    pub fn price_range(&self) -> (Decimal, Decimal) {
        let base = self.base_price();
        self.variants().iter().fold((base, base), |(lo, hi), v| (lo.min(v.price), hi.max(v.price)))
    }

    /// Whole-percent saving against the original price, if there is one.
    pub fn discount_percent(&self, selection: &AttributeSelection) -> Option<u32> {
        let original = self.original_price(selection)?;
        let current = self.current_price(selection);
        if original <= current || original <= Decimal::ZERO { return None; }
        ((original - current) / original * Decimal::ONE_HUNDRED).round().to_u32()
    }

    pub fn primary_image(&self, selection: &AttributeSelection) -> Option<&str> {
        self.matching_variant(selection)
            .and_then(|v| v.image.as_deref())
            .or_else(|| self.images.first().map(String::as_str))
    }

    /// Whether every selected pair names an option this product offers.
    pub fn accepts_selection(&self, selection: &AttributeSelection) -> bool {
        match &self.details {
            ProductDetails::Legacy(l) => selection.iter().all(|(attr, value)| match attr.as_str() {
                "size" => l.sizes.contains(value),
                "color" => l.colors.contains(value),
                _ => false,
            }),
            ProductDetails::Enhanced(e) => selection.iter().all(|(attr, value)| {
                e.attributes.iter().any(|a| &a.id == attr && a.options.contains(value))
            }),
        }
    }

    /// Converts a legacy record to the enhanced shape. Sizes and colors become
    /// attributes and every size/color combination becomes a variant at the
    /// legacy price. Enhanced records are returned unchanged.
    pub fn to_enhanced(&self) -> Product {
        let ProductDetails::Legacy(legacy) = &self.details else { return self.clone(); };

        let mut attributes = Vec::new();
        if !legacy.sizes.is_empty() {
            attributes.push(ProductAttribute { id: "size".into(), name: "Size".into(), kind: AttributeKind::Size, options: legacy.sizes.clone() });
        }
        if !legacy.colors.is_empty() {
            attributes.push(ProductAttribute { id: "color".into(), name: "Color".into(), kind: AttributeKind::Color, options: legacy.colors.clone() });
        }

        let inventory = if legacy.in_stock { legacy.stock_quantity.unwrap_or(MIGRATED_DEFAULT_STOCK) } else { 0 };
        let stem = slugify(&self.name);
        let variants = if attributes.is_empty() { vec![] } else {
            option_combinations(&attributes).into_iter().enumerate().map(|(i, combo)| {
                let values: Vec<&str> = attributes.iter().filter_map(|a| combo.get(&a.id).map(String::as_str)).collect();
                ProductVariant {
                    id: format!("v{}", i + 1),
                    sku: Sku::for_variant(&stem, &values).unwrap_or_else(|_| Sku::generate()),
                    attributes: combo,
                    price: legacy.price,
                    original_price: None,
                    inventory,
                    image: None,
                }
            }).collect()
        };

        let mut migrated = self.clone();
        migrated.details = ProductDetails::Enhanced(EnhancedDetails {
            base_price: legacy.price,
            original_price: legacy.original_price,
            base_stock: inventory,
            attributes,
            variants,
        });
        migrated.updated_at = Utc::now();
        migrated
    }

    /// Checks record-level rules and the variant/attribute invariant.
    pub fn validate(&self) -> Result<(), Vec<ProductIssue>> {
        let mut issues = Vec::new();
        if self.name.trim().is_empty() { issues.push(ProductIssue::MissingName); }
        if self.category.trim().is_empty() { issues.push(ProductIssue::MissingCategory); }
        if self.base_price() <= Decimal::ZERO { issues.push(ProductIssue::NonPositivePrice); }
        if self.rating < Decimal::ZERO || self.rating > MAX_RATING { issues.push(ProductIssue::RatingOutOfRange); }

        if let ProductDetails::Enhanced(e) = &self.details {
            let mut seen_attrs = HashSet::new();
            for attr in &e.attributes {
                if !seen_attrs.insert(attr.id.as_str()) { issues.push(ProductIssue::DuplicateAttribute(attr.id.clone())); }
                if attr.options.is_empty() { issues.push(ProductIssue::EmptyOptions(attr.id.clone())); }
            }
            let mut seen_ids = HashSet::new();
            let mut seen_combos = HashSet::new();
            for v in &e.variants {
                if !seen_ids.insert(v.id.as_str()) { issues.push(ProductIssue::DuplicateVariant(v.id.clone())); }
                if !seen_combos.insert(&v.attributes) { issues.push(ProductIssue::DuplicateCombination(v.id.clone())); }
                if v.price <= Decimal::ZERO { issues.push(ProductIssue::NonPositiveVariantPrice(v.id.clone())); }
                for (attr_id, value) in &v.attributes {
                    match e.attributes.iter().find(|a| &a.id == attr_id) {
                        None => issues.push(ProductIssue::UnknownAttribute { variant: v.id.clone(), attribute: attr_id.clone() }),
                        Some(a) if !a.options.contains(value) => issues.push(ProductIssue::UnknownOption {
                            variant: v.id.clone(), attribute: attr_id.clone(), value: value.clone(),
                        }),
                        Some(_) => {}
                    }
                }
            }
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn option_combinations(attributes: &[ProductAttribute]) -> Vec<AttributeSelection> {
    attributes.iter().fold(vec![AttributeSelection::new()], |acc, attr| {
        acc.iter().flat_map(|partial| attr.options.iter().map(move |opt| {
            let mut next = partial.clone();
            next.insert(attr.id.clone(), opt.clone());
            next
        })).collect()
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductIssue {
    MissingName,
    MissingCategory,
    NonPositivePrice,
    RatingOutOfRange,
    DuplicateAttribute(String),
    EmptyOptions(String),
    DuplicateVariant(String),
    DuplicateCombination(String),
    NonPositiveVariantPrice(String),
    UnknownAttribute { variant: String, attribute: String },
    UnknownOption { variant: String, attribute: String, value: String },
}

impl std::error::Error for ProductIssue {}
impl std::fmt::Display for ProductIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName => write!(f, "name is required"),
            Self::MissingCategory => write!(f, "category is required"),
            Self::NonPositivePrice => write!(f, "price must be greater than zero"),
            Self::RatingOutOfRange => write!(f, "rating must be between 0 and 5"),
            Self::DuplicateAttribute(id) => write!(f, "attribute '{id}' is declared twice"),
            Self::EmptyOptions(id) => write!(f, "attribute '{id}' has no options"),
            Self::DuplicateVariant(id) => write!(f, "variant id '{id}' is used twice"),
            Self::DuplicateCombination(id) => write!(f, "variant '{id}' repeats another variant's attributes"),
            Self::NonPositiveVariantPrice(id) => write!(f, "variant '{id}' price must be greater than zero"),
            Self::UnknownAttribute { variant, attribute } => write!(f, "variant '{variant}' uses undeclared attribute '{attribute}'"),
            Self::UnknownOption { variant, attribute, value } => {
                write!(f, "variant '{variant}' sets '{attribute}' to '{value}', which is not an option")
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn selection(pairs: &[(&str, &str)]) -> AttributeSelection {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    pub(crate) fn legacy_tee() -> Product {
        Product::create("Basic Tee", "apparel", ProductDetails::Legacy(LegacyDetails {
            price: Decimal::new(1999, 2), original_price: Some(Decimal::new(2499, 2)), in_stock: true,
            stock_quantity: None, sizes: vec!["S".into(), "M".into(), "L".into()], colors: vec!["black".into(), "white".into()],
        }))
    }

    pub(crate) fn enhanced_hoodie() -> Product {
        let variant = |id: &str, size: &str, color: &str, price: i64, inventory: u32| ProductVariant {
            id: id.into(), sku: Sku::new(format!("HOOD-{size}-{color}")).unwrap(),
            attributes: selection(&[("size", size), ("color", color)]),
            price: Decimal::new(price, 2), original_price: None, inventory, image: Some(format!("{id}.jpg")),
        };
        let mut p = Product::create("Hoodie", "apparel", ProductDetails::Enhanced(EnhancedDetails {
            base_price: Decimal::new(4000, 2), original_price: Some(Decimal::new(5000, 2)), base_stock: 7,
            attributes: vec![
                ProductAttribute { id: "size".into(), name: "Size".into(), kind: AttributeKind::Size, options: vec!["M".into(), "L".into()] },
                ProductAttribute { id: "color".into(), name: "Color".into(), kind: AttributeKind::Color, options: vec!["grey".into(), "navy".into()] },
            ],
            variants: vec![
                variant("m-grey", "M", "grey", 4200, 3),
                variant("l-grey", "L", "grey", 4500, 0),
                variant("l-navy", "L", "navy", 4600, 5),
            ],
        }));
        p.images = vec!["hoodie.jpg".into()];
        p
    }

    #[test]
    fn partial_selection_matches_first_superset_variant() {
        let p = enhanced_hoodie();
        assert_eq!(p.matching_variant(&selection(&[("size", "L")])).unwrap().id, "l-grey");
        assert_eq!(p.matching_variant(&selection(&[("size", "L"), ("color", "navy")])).unwrap().id, "l-navy");
        assert_eq!(p.current_price(&selection(&[("color", "navy")])), Decimal::new(4600, 2));
    }

    #[test]
    fn resolve_defaults_to_first_variant() {
        let p = enhanced_hoodie();
        assert_eq!(p.resolve_variant(&AttributeSelection::new()).unwrap().id, "m-grey");
        assert_eq!(p.resolve_variant(&selection(&[("size", "XL")])).unwrap().id, "m-grey");
        assert!(legacy_tee().resolve_variant(&AttributeSelection::new()).is_none());
    }

    #[test]
    fn no_match_falls_back_to_base_price_and_stock() {
        let p = enhanced_hoodie();
        let none = selection(&[("size", "M"), ("color", "navy")]);
        assert!(p.matching_variant(&none).is_none());
        assert_eq!(p.current_price(&none), Decimal::new(4000, 2));
        assert_eq!(p.available_quantity(&none), Some(7));
        assert_eq!(p.current_price(&AttributeSelection::new()), Decimal::new(4000, 2));
    }

    #[test]
    fn stock_follows_matched_variant() {
        let p = enhanced_hoodie();
        assert!(!p.is_in_stock(&selection(&[("size", "L"), ("color", "grey")])));
        assert!(p.is_in_stock(&selection(&[("color", "navy")])));
        assert_eq!(p.primary_image(&selection(&[("color", "navy")])), Some("l-navy.jpg"));
        assert_eq!(p.primary_image(&AttributeSelection::new()), Some("hoodie.jpg"));
    }

    #[test]
    fn legacy_stock_is_untracked_unless_counted() {
        let mut p = legacy_tee();
        assert_eq!(p.available_quantity(&AttributeSelection::new()), None);
        assert!(p.is_in_stock(&AttributeSelection::new()));
        if let ProductDetails::Legacy(l) = &mut p.details { l.in_stock = false; }
        assert_eq!(p.available_quantity(&AttributeSelection::new()), Some(0));
        assert!(!p.is_in_stock(&AttributeSelection::new()));
    }

    #[test]
    fn price_range_and_discount() {
        let p = enhanced_hoodie();
        assert_eq!(p.price_range(), (Decimal::new(4000, 2), Decimal::new(4600, 2)));
        assert_eq!(p.discount_percent(&AttributeSelection::new()), Some(20));
        assert_eq!(legacy_tee().discount_percent(&AttributeSelection::new()), Some(20));
    }

    #[test]
    fn migration_builds_every_combination() {
        let migrated = legacy_tee().to_enhanced();
        assert!(migrated.is_enhanced());
        assert_eq!(migrated.variants().len(), 6);
        assert!(migrated.validate().is_ok());
        let v = migrated.matching_variant(&selection(&[("size", "M"), ("color", "white")])).unwrap();
        assert_eq!(v.sku.as_str(), "BASIC-TEE-M-WHITE");
        assert_eq!(v.inventory, MIGRATED_DEFAULT_STOCK);
        assert_eq!(migrated.current_price(&AttributeSelection::new()), Decimal::new(1999, 2));
    }

    #[test]
    fn migration_without_options_has_no_variants() {
        let mut p = legacy_tee();
        if let ProductDetails::Legacy(l) = &mut p.details { l.sizes.clear(); l.colors.clear(); l.stock_quantity = Some(4); }
        let migrated = p.to_enhanced();
        assert!(migrated.variants().is_empty());
        assert_eq!(migrated.available_quantity(&AttributeSelection::new()), Some(4));
    }

    #[test]
    fn validate_reports_undeclared_attributes() {
        let mut p = enhanced_hoodie();
        if let ProductDetails::Enhanced(e) = &mut p.details {
            e.variants[0].attributes.insert("material".into(), "wool".into());
            e.variants[1].attributes.insert("size".into(), "XXL".into());
        }
        let issues = p.validate().unwrap_err();
        assert!(issues.contains(&ProductIssue::UnknownAttribute { variant: "m-grey".into(), attribute: "material".into() }));
        assert!(issues.contains(&ProductIssue::UnknownOption { variant: "l-grey".into(), attribute: "size".into(), value: "XXL".into() }));
    }

    #[test]
    fn accepts_selection_checks_offered_options() {
        assert!(legacy_tee().accepts_selection(&selection(&[("size", "M")])));
        assert!(!legacy_tee().accepts_selection(&selection(&[("size", "XL")])));
        assert!(enhanced_hoodie().accepts_selection(&selection(&[("color", "navy")])));
        assert!(!enhanced_hoodie().accepts_selection(&selection(&[("fit", "slim")])));
    }

    #[test]
    fn shape_tag_selects_the_variant() {
        let json = serde_json::json!({
            "id": "0190a5d2-7c2e-7c6f-8d3b-3f2f6a1b9c10",
            "name": "Mug", "category": "kitchen", "shape": "legacy", "price": 12.5,
            "created_at": "2024-05-01T00:00:00Z", "updated_at": "2024-05-01T00:00:00Z"
        });
        let p: Product = serde_json::from_value(json).unwrap();
        assert!(p.is_legacy());
        assert_eq!(p.base_price(), Decimal::new(125, 1));
        assert!(p.is_in_stock(&AttributeSelection::new()));
    }
}
