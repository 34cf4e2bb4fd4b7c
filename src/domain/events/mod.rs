//! Domain events
use crate::domain::aggregates::{CartChange, OrderStatus};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum DomainEvent {
    Cart { user_id: String, change: CartChange },
    Product { product_id: Uuid, change: RecordChange },
    Category { category_id: Uuid, change: RecordChange },
    Order { order_id: Uuid, user_id: String, status: OrderStatus },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordChange { Created, Updated, Deleted, Migrated }

impl DomainEvent {
    /// Message subject, e.g. `storefront.cart.user-1`.
    pub fn subject(&self) -> String {
        match self {
            Self::Cart { user_id, .. } => format!("storefront.cart.{user_id}"),
            Self::Product { product_id, .. } => format!("storefront.products.{product_id}"),
            Self::Category { category_id, .. } => format!("storefront.categories.{category_id}"),
            Self::Order { order_id, .. } => format!("storefront.orders.{order_id}"),
        }
    }

    /// The shopper an event concerns, when there is one.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Cart { user_id, .. } | Self::Order { user_id, .. } => Some(user_id),
            Self::Product { .. } | Self::Category { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_events_serialize_with_topic_and_change_type() {
        let event = DomainEvent::Cart { user_id: "u1".into(), change: CartChange::Cleared };
        assert_eq!(event.subject(), "storefront.cart.u1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], "cart");
        assert_eq!(json["change"]["type"], "cleared");
    }
}
