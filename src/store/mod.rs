//! Persistence seam.
//!
//! Records are kept as JSON documents; [`CommerceStore`] is the only way the
//! rest of the crate reads or writes them. [`PgStore`] is the production
//! backend and [`MemoryStore`] serves local development and tests.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgStore, PoolConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{CartItem, Category, Order, OrderStatus, Product};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[async_trait]
pub trait CommerceStore: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn health_check(&self) -> Result<(), StoreError>;

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;
    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, StoreError>;
    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>, StoreError>;
    /// Fails with [`StoreError::Conflict`] when the slug is taken.
    async fn insert_category(&self, category: &Category) -> Result<(), StoreError>;
    async fn update_category(&self, category: &Category) -> Result<(), StoreError>;
    async fn delete_category(&self, id: Uuid) -> Result<(), StoreError>;

    /// Products, oldest first, optionally limited to one category slug.
    async fn list_products(&self, category_slug: Option<&str>) -> Result<Vec<Product>, StoreError>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
    /// Writes all products or none of them.
    async fn insert_products(&self, products: &[Product]) -> Result<(), StoreError>;
    async fn update_product(&self, product: &Product) -> Result<(), StoreError>;
    async fn delete_product(&self, id: Uuid) -> Result<(), StoreError>;

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        self.insert_products(std::slice::from_ref(product)).await
    }

    async fn cart_items(&self, user_id: &str) -> Result<Vec<CartItem>, StoreError>;
    /// Creates the line, or adds `item.quantity` to the user's existing line
    /// for the same product and variant. Returns the stored line.
    async fn add_cart_item(&self, item: &CartItem) -> Result<CartItem, StoreError>;
    /// Sets a line's quantity; zero deletes it and returns `None`.
    async fn set_cart_quantity(&self, user_id: &str, item_id: Uuid, quantity: u32) -> Result<Option<CartItem>, StoreError>;
    async fn remove_cart_item(&self, user_id: &str, item_id: Uuid) -> Result<(), StoreError>;
    async fn clear_cart(&self, user_id: &str) -> Result<(), StoreError>;

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    /// Newest first.
    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError>;
    /// Orders created in `[start, end)`, oldest first.
    async fn orders_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>, StoreError>;
    async fn update_order(&self, order: &Order) -> Result<(), StoreError>;
}
