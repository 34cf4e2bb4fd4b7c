//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::product::{Product, ProductVariant};
use crate::domain::value_objects::{AttributeSelection, Money, Quantity, DEFAULT_CURRENCY};

/// The parts of a product copied onto a cart line when it is added.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub category: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: String,
    pub product: ProductSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub selected_attributes: AttributeSelection,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    /// New line for `quantity` units of a product, priced for the variant when
    /// one was resolved and for the selection otherwise.
    pub fn for_product(
        user_id: impl Into<String>,
        product: &Product,
        variant: Option<&ProductVariant>,
        selection: AttributeSelection,
        quantity: u32,
    ) -> Self {
        let now = Utc::now();
        let (unit_price, image, selected_attributes) = match variant {
            Some(v) => (
                v.price,
                v.image.clone().or_else(|| product.images.first().cloned()),
                v.attributes.clone(),
            ),
            None => (
                product.current_price(&selection),
                product.primary_image(&selection).map(str::to_string),
                selection,
            ),
        };
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            product: ProductSnapshot { product_id: product.id, name: product.name.clone(), image, category: product.category.clone() },
            variant_id: variant.map(|v| v.id.clone()),
            selected_attributes,
            unit_price,
            quantity,
            added_at: now,
            updated_at: now,
        }
    }

    pub fn line_total(&self) -> Money { Money::usd(self.unit_price).multiply(self.quantity) }

    /// Identity of this line within its product: the variant id, or the
    /// chosen options when no variant applies.
    pub fn line_key(&self) -> String { line_key(self.variant_id.as_deref(), &self.selected_attributes) }

    pub fn same_line(&self, other: &CartItem) -> bool {
        self.product.product_id == other.product.product_id && self.line_key() == other.line_key()
    }
}

/// `variant_id` when present, else the selection as `id=value` pairs joined
/// by `|` in attribute order (`color=red|size=L`). Empty for a bare product.
pub fn line_key(variant_id: Option<&str>, selection: &AttributeSelection) -> String {
    match variant_id {
        Some(id) => id.to_string(),
        None => selection.iter().map(|(attr, value)| format!("{attr}={value}")).collect::<Vec<_>>().join("|"),
    }
}

/// A change to one user's cart, as published on the change feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartChange {
    Upserted { item: CartItem },
    Removed { item_id: Uuid },
    Cleared,
}

#[derive(Clone, Debug)]
pub struct Cart {
    user_id: String,
    items: Vec<CartItem>,
    subtotal: Money,
    currency: String,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartSummary {
    pub user_id: String,
    pub items: Vec<CartItem>,
    pub item_count: u32,
    pub subtotal: Money,
}

impl Cart {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(), items: vec![], subtotal: Money::zero(DEFAULT_CURRENCY),
            currency: DEFAULT_CURRENCY.to_string(), updated_at: Utc::now(),
        }
    }

    /// Builds a cart from stored line documents, folding any duplicate lines
    /// into one.
    pub fn from_items(user_id: impl Into<String>, items: impl IntoIterator<Item = CartItem>) -> Self {
        let mut cart = Self::new(user_id);
        for item in items { cart.add_item(item); }
        cart
    }

    pub fn user_id(&self) -> &str { &self.user_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn line_count(&self) -> usize { self.items.len() }
    pub fn item_count(&self) -> u32 { self.items.iter().fold(0, |acc, i| acc.saturating_add(i.quantity)) }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn find_line(&self, product_id: Uuid, key: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product.product_id == product_id && i.line_key() == key)
    }

    /// Adds a line, or increments the quantity of the existing line with the
    /// same product and line key. Returns the resulting line.
    pub fn add_item(&mut self, item: CartItem) -> CartItem {
        let line = if let Some(existing) = self.items.iter_mut().find(|i| i.same_line(&item)) {
            existing.quantity = Quantity::new(existing.quantity).add(item.quantity).value();
            existing.unit_price = item.unit_price;
            existing.updated_at = item.updated_at;
            existing.clone()
        } else {
            self.items.push(item.clone());
            item
        };
        self.recalculate();
        line
    }

    /// Sets a line's quantity; zero removes it and yields `None`.
    pub fn update_quantity(&mut self, item_id: Uuid, quantity: u32) -> Result<Option<CartItem>, CartError> {
        let item = self.items.iter_mut().find(|i| i.id == item_id).ok_or(CartError::ItemNotFound)?;
        let updated = if quantity == 0 {
            None
        } else {
            item.quantity = quantity;
            item.updated_at = Utc::now();
            Some(item.clone())
        };
        if updated.is_none() { self.items.retain(|i| i.id != item_id); }
        self.recalculate();
        Ok(updated)
    }

    pub fn remove_item(&mut self, item_id: Uuid) -> Result<CartItem, CartError> {
        let pos = self.items.iter().position(|i| i.id == item_id).ok_or(CartError::ItemNotFound)?;
        let removed = self.items.remove(pos);
        self.recalculate();
        Ok(removed)
    }

    pub fn clear(&mut self) { self.items.clear(); self.recalculate(); }

    /// Folds a change-feed event into this (client-side) cart.
    pub fn apply(&mut self, change: &CartChange) {
        match change {
            CartChange::Upserted { item } => {
                match self.items.iter_mut().find(|i| i.id == item.id || i.same_line(item)) {
                    Some(existing) => *existing = item.clone(),
                    None => self.items.push(item.clone()),
                }
            }
            CartChange::Removed { item_id } => self.items.retain(|i| i.id != *item_id),
            CartChange::Cleared => self.items.clear(),
        }
        self.recalculate();
    }

    pub fn summary(&self) -> CartSummary {
        CartSummary {
            user_id: self.user_id.clone(),
            items: self.items.clone(),
            item_count: self.item_count(),
            subtotal: self.subtotal.clone(),
        }
    }

    fn recalculate(&mut self) {
        self.subtotal = self.items.iter().fold(Money::zero(&self.currency), |acc, i| acc.add(&i.line_total()).unwrap_or(acc));
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Cart item not found") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::{enhanced_hoodie, legacy_tee};

    #[test]
    fn test_cart_operations() {
        let tee = legacy_tee();
        let mut cart = Cart::new("user-1");
        cart.add_item(CartItem::for_product("user-1", &tee, None, AttributeSelection::new(), 2));
        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.subtotal().amount(), Decimal::new(3998, 2));
        let merged = cart.add_item(CartItem::for_product("user-1", &tee, None, AttributeSelection::new(), 1));
        assert_eq!(cart.line_count(), 1);
        assert_eq!(merged.quantity, 3);
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn different_variants_are_separate_lines() {
        let hoodie = enhanced_hoodie();
        let mut cart = Cart::new("user-1");
        cart.add_item(CartItem::for_product("user-1", &hoodie, hoodie.variant("m-grey"), AttributeSelection::new(), 1));
        cart.add_item(CartItem::for_product("user-1", &hoodie, hoodie.variant("l-navy"), AttributeSelection::new(), 1));
        assert_eq!(cart.line_count(), 2);
        assert_eq!(cart.subtotal().amount(), Decimal::new(8800, 2));
        let line = cart.find_line(hoodie.id, "l-navy").unwrap();
        assert_eq!(line.selected_attributes.get("color").map(String::as_str), Some("navy"));
    }

    #[test]
    fn legacy_selections_are_separate_lines() {
        let tee = legacy_tee();
        let size = |s: &str| AttributeSelection::from([("size".to_string(), s.to_string())]);
        let mut cart = Cart::new("user-1");
        cart.add_item(CartItem::for_product("user-1", &tee, None, size("S"), 1));
        cart.add_item(CartItem::for_product("user-1", &tee, None, size("L"), 1));
        cart.add_item(CartItem::for_product("user-1", &tee, None, size("L"), 2));
        assert_eq!(cart.line_count(), 2);
        assert_eq!(cart.find_line(tee.id, "size=S").unwrap().quantity, 1);
        assert_eq!(cart.find_line(tee.id, "size=L").unwrap().quantity, 3);
    }

    #[test]
    fn line_key_orders_attributes() {
        let selection = AttributeSelection::from([
            ("size".to_string(), "L".to_string()),
            ("color".to_string(), "red".to_string()),
        ]);
        assert_eq!(line_key(None, &selection), "color=red|size=L");
        assert_eq!(line_key(Some("l-navy"), &selection), "l-navy");
        assert_eq!(line_key(None, &AttributeSelection::new()), "");
    }

    #[test]
    fn zero_quantity_removes_line() {
        let mut cart = Cart::new("user-1");
        let line = cart.add_item(CartItem::for_product("user-1", &legacy_tee(), None, AttributeSelection::new(), 2));
        assert_eq!(cart.update_quantity(line.id, 5).unwrap().unwrap().quantity, 5);
        assert!(cart.update_quantity(line.id, 0).unwrap().is_none());
        assert!(cart.is_empty());
        assert_eq!(cart.remove_item(line.id), Err(CartError::ItemNotFound));
    }

    #[test]
    fn apply_merges_feed_events() {
        let tee = legacy_tee();
        let mut client = Cart::new("user-1");
        let mut item = CartItem::for_product("user-1", &tee, None, AttributeSelection::new(), 1);
        client.apply(&CartChange::Upserted { item: item.clone() });
        item.quantity = 4;
        client.apply(&CartChange::Upserted { item: item.clone() });
        assert_eq!(client.line_count(), 1);
        assert_eq!(client.item_count(), 4);
        client.apply(&CartChange::Removed { item_id: item.id });
        assert!(client.is_empty());
    }

    #[test]
    fn from_items_folds_duplicate_documents() {
        let tee = legacy_tee();
        let docs = vec![
            CartItem::for_product("user-1", &tee, None, AttributeSelection::new(), 1),
            CartItem::for_product("user-1", &tee, None, AttributeSelection::new(), 2),
        ];
        let cart = Cart::from_items("user-1", docs);
        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.summary().item_count, 3);
    }
}
