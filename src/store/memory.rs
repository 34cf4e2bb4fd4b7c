use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CommerceStore, StoreError};
use crate::domain::aggregates::{Cart, CartError, CartItem, Category, Order, OrderStatus, Product};
use crate::domain::value_objects::slugify;

#[derive(Default)]
struct Inner {
    categories: Vec<Category>,
    products: Vec<Product>,
    carts: HashMap<String, Cart>,
    orders: Vec<Order>,
}

/// Process-local backend. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl From<CartError> for StoreError {
    fn from(_: CartError) -> Self { StoreError::NotFound }
}

fn replace<T>(records: &mut [T], record: &T, same: impl Fn(&T) -> bool) -> Result<(), StoreError>
where
    T: Clone,
{
    let slot = records.iter_mut().find(|r| same(r)).ok_or(StoreError::NotFound)?;
    *slot = record.clone();
    Ok(())
}

fn remove<T>(records: &mut Vec<T>, same: impl Fn(&T) -> bool) -> Result<(), StoreError> {
    let before = records.len();
    records.retain(|r| !same(r));
    if records.len() == before { Err(StoreError::NotFound) } else { Ok(()) }
}

#[async_trait]
impl CommerceStore for MemoryStore {
    fn backend(&self) -> &'static str { "memory" }

    async fn health_check(&self) -> Result<(), StoreError> { Ok(()) }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let mut categories = self.inner.read().await.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, StoreError> {
        Ok(self.inner.read().await.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>, StoreError> {
        Ok(self.inner.read().await.categories.iter().find(|c| c.slug == slug).cloned())
    }

    async fn insert_category(&self, category: &Category) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.categories.iter().any(|c| c.slug == category.slug || c.id == category.id) {
            return Err(StoreError::Conflict("a category with that slug already exists".into()));
        }
        inner.categories.push(category.clone());
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.categories.iter().any(|c| c.slug == category.slug && c.id != category.id) {
            return Err(StoreError::Conflict("a category with that slug already exists".into()));
        }
        replace(&mut inner.categories, category, |c| c.id == category.id)
    }

    async fn delete_category(&self, id: Uuid) -> Result<(), StoreError> {
        remove(&mut self.inner.write().await.categories, |c| c.id == id)
    }

    async fn list_products(&self, category_slug: Option<&str>) -> Result<Vec<Product>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.products.iter()
            .filter(|p| category_slug.map_or(true, |slug| slugify(&p.category) == slug))
            .cloned()
            .collect())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.inner.read().await.products.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_products(&self, products: &[Product]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let duplicate = products.iter().enumerate().any(|(i, p)| {
            inner.products.iter().any(|existing| existing.id == p.id) || products[..i].iter().any(|q| q.id == p.id)
        });
        if duplicate {
            return Err(StoreError::Conflict("a product with that id already exists".into()));
        }
        inner.products.extend_from_slice(products);
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        replace(&mut self.inner.write().await.products, product, |p| p.id == product.id)
    }

    async fn delete_product(&self, id: Uuid) -> Result<(), StoreError> {
        remove(&mut self.inner.write().await.products, |p| p.id == id)
    }

    async fn cart_items(&self, user_id: &str) -> Result<Vec<CartItem>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.carts.get(user_id).map(|c| c.items().to_vec()).unwrap_or_default())
    }

    async fn add_cart_item(&self, item: &CartItem) -> Result<CartItem, StoreError> {
        let mut inner = self.inner.write().await;
        let cart = inner.carts.entry(item.user_id.clone()).or_insert_with(|| Cart::new(item.user_id.clone()));
        Ok(cart.add_item(item.clone()))
    }

    async fn set_cart_quantity(&self, user_id: &str, item_id: Uuid, quantity: u32) -> Result<Option<CartItem>, StoreError> {
        let mut inner = self.inner.write().await;
        let cart = inner.carts.get_mut(user_id).ok_or(StoreError::NotFound)?;
        Ok(cart.update_quantity(item_id, quantity)?)
    }

    async fn remove_cart_item(&self, user_id: &str, item_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let cart = inner.carts.get_mut(user_id).ok_or(StoreError::NotFound)?;
        cart.remove_item(item_id)?;
        Ok(())
    }

    async fn clear_cart(&self, user_id: &str) -> Result<(), StoreError> {
        if let Some(cart) = self.inner.write().await.carts.get_mut(user_id) {
            cart.clear();
        }
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.orders.iter().any(|o| o.id == order.id) {
            return Err(StoreError::Conflict("an order with that id already exists".into()));
        }
        inner.orders.push(order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.read().await.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner.orders.iter()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn orders_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner.orders.iter()
            .filter(|o| o.created_at >= start && o.created_at < end)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        replace(&mut self.inner.write().await.orders, order, |o| o.id == order.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::{enhanced_hoodie, legacy_tee};
    use crate::domain::value_objects::AttributeSelection;

    #[tokio::test]
    async fn cart_lines_merge_by_product_and_variant() {
        let store = MemoryStore::new();
        let hoodie = enhanced_hoodie();
        let first = store.add_cart_item(&CartItem::for_product("u1", &hoodie, hoodie.variant("m-grey"), AttributeSelection::new(), 1)).await.unwrap();
        let merged = store.add_cart_item(&CartItem::for_product("u1", &hoodie, hoodie.variant("m-grey"), AttributeSelection::new(), 2)).await.unwrap();
        store.add_cart_item(&CartItem::for_product("u1", &hoodie, hoodie.variant("l-navy"), AttributeSelection::new(), 1)).await.unwrap();
        assert_eq!(merged.id, first.id);
        assert_eq!(merged.quantity, 3);
        assert_eq!(store.cart_items("u1").await.unwrap().len(), 2);
        assert!(store.cart_items("someone-else").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cart_mutations_report_missing_lines() {
        let store = MemoryStore::new();
        let line = store.add_cart_item(&CartItem::for_product("u1", &legacy_tee(), None, AttributeSelection::new(), 1)).await.unwrap();
        assert!(matches!(store.set_cart_quantity("u2", line.id, 3).await, Err(StoreError::NotFound)));
        assert!(store.set_cart_quantity("u1", line.id, 0).await.unwrap().is_none());
        assert!(matches!(store.remove_cart_item("u1", line.id).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn category_slugs_are_unique() {
        let store = MemoryStore::new();
        store.insert_category(&Category::create("Home Decor", "")).await.unwrap();
        let err = store.insert_category(&Category::create("home decor", "")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.find_category_by_slug("home-decor").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn product_batches_are_all_or_nothing() {
        let store = MemoryStore::new();
        let tee = legacy_tee();
        store.insert_product(&tee).await.unwrap();
        let err = store.insert_products(&[enhanced_hoodie(), tee.clone()]).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.list_products(None).await.unwrap().len(), 1);
        assert_eq!(store.list_products(Some("apparel")).await.unwrap().len(), 1);
    }
}
