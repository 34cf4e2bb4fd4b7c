//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::cart::CartItem;
use crate::domain::value_objects::{AttributeSelection, Money, DEFAULT_CURRENCY};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub email: String,
    pub status: OrderStatus,
    pub items: Vec<LineItem>,
    pub total: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<Address>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub selected_attributes: AttributeSelection,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl LineItem {
    pub fn total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }
}

impl From<&CartItem> for LineItem {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product.product_id, name: item.product.name.clone(), category: item.product.category.clone(),
            variant_id: item.variant_id.clone(), selected_attributes: item.selected_attributes.clone(),
            unit_price: item.unit_price, quantity: item.quantity,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address { pub name: String, pub street1: String, #[serde(default)] pub street2: Option<String>, pub city: String, #[serde(default)] pub state: Option<String>, pub zip: String, pub country: String }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (*self, next),
            (Pending, Processing) | (Processing, Shipped) | (Shipped, Delivered) | (Pending | Processing, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }
}

impl Order {
    /// Snapshots cart lines into a pending order.
    pub fn from_cart(user_id: impl Into<String>, email: impl Into<String>, items: &[CartItem]) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(), user_id: user_id.into(), email: email.into(), status: OrderStatus::Pending,
            items: items.iter().map(LineItem::from).collect(), total: Money::zero(DEFAULT_CURRENCY),
            shipping_address: None, created_at: now, updated_at: now,
        };
        order.recalculate();
        Ok(order)
    }

    pub fn units(&self) -> u64 { self.items.iter().map(|i| u64::from(i.quantity)).sum() }

    pub fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if self.status == next { return Ok(()); }
        if !self.status.can_transition_to(next) {
            return Err(OrderError::IllegalTransition { from: self.status, to: next });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> { self.transition(OrderStatus::Cancelled) }

    fn recalculate(&mut self) {
        let currency = self.total.currency().to_string();
        self.total = self.items.iter().fold(Money::zero(&currency), |acc, i| {
            acc.add(&Money::new(i.total(), &currency)).unwrap_or(acc)
        });
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError { NoItems, IllegalTransition { from: OrderStatus, to: OrderStatus } }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "Order has no items"),
            Self::IllegalTransition { from, to } => write!(f, "Cannot move order from {} to {}", from.as_str(), to.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::legacy_tee;

    #[test]
    fn test_order_workflow() {
        let line = CartItem::for_product("user-1", &legacy_tee(), None, AttributeSelection::new(), 2);
        let mut order = Order::from_cart("user-1", "test@example.com", &[line]).unwrap();
        assert_eq!(order.total.amount(), Decimal::new(3998, 2));
        assert_eq!(order.units(), 2);
        order.transition(OrderStatus::Processing).unwrap();
        order.transition(OrderStatus::Shipped).unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.cancel(), Err(OrderError::IllegalTransition { from: OrderStatus::Shipped, to: OrderStatus::Cancelled }));
    }

    #[test]
    fn empty_cart_cannot_be_ordered() {
        assert_eq!(Order::from_cart("user-1", "a@b.c", &[]).unwrap_err(), OrderError::NoItems);
    }

    #[test]
    fn status_parsing_accepts_both_spellings() {
        assert_eq!(OrderStatus::parse("Canceled"), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::parse("refunded"), None);
        assert!(OrderStatus::Delivered.is_terminal());
    }
}
