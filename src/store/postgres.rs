use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use std::time::Duration;
use uuid::Uuid;

use super::{CommerceStore, StoreError};
use crate::domain::aggregates::{CartItem, Category, Order, OrderStatus, Product};
use crate::domain::value_objects::slugify;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_connections: 10, acquire_timeout_secs: 10 }
    }
}

/// Postgres backend storing each record as a JSONB document next to the
/// columns its queries filter on.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    quantity: i32,
    doc: Json<CartItem>,
    added_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartRow {
    fn into_item(self) -> CartItem {
        let mut item = self.doc.0;
        item.id = self.id;
        item.quantity = u32::try_from(self.quantity).unwrap_or(0);
        item.added_at = self.added_at;
        item.updated_at = self.updated_at;
        item
    }
}

const CART_COLUMNS: &str = "id, quantity, doc, added_at, updated_at";

impl PgStore {
    /// Connects, then applies pending migrations.
    pub async fn connect(database_url: &str, config: PoolConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(database_url)
            .await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!(max_connections = config.max_connections, "postgres store ready");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }
}


fn quantity_param(quantity: u32) -> i32 { i32::try_from(quantity).unwrap_or(i32::MAX) }

fn map_unique_violation(error: sqlx::Error, message: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &error {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Conflict(message.to_string());
        }
    }
    StoreError::Sqlx(error)
}

fn expect_row(rows_affected: u64) -> Result<(), StoreError> {
    if rows_affected == 0 { Err(StoreError::NotFound) } else { Ok(()) }
}

#[async_trait]
impl CommerceStore for PgStore {
    fn backend(&self) -> &'static str { "postgres" }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows: Vec<(Json<Category>,)> = sqlx::query_as("SELECT doc FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(doc,)| doc.0).collect())
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, StoreError> {
        let row: Option<(Json<Category>,)> = sqlx::query_as("SELECT doc FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(doc,)| doc.0))
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>, StoreError> {
        let row: Option<(Json<Category>,)> = sqlx::query_as("SELECT doc FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(doc,)| doc.0))
    }

    async fn insert_category(&self, category: &Category) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO categories (id, slug, name, doc, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(category.id)
            .bind(&category.slug)
            .bind(&category.name)
            .bind(Json(category))
            .bind(category.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "a category with that slug already exists"))?;
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE categories SET slug = $2, name = $3, doc = $4 WHERE id = $1")
            .bind(category.id)
            .bind(&category.slug)
            .bind(&category.name)
            .bind(Json(category))
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "a category with that slug already exists"))?;
        expect_row(result.rows_affected())
    }

    async fn delete_category(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1").bind(id).execute(&self.pool).await?;
        expect_row(result.rows_affected())
    }

    async fn list_products(&self, category_slug: Option<&str>) -> Result<Vec<Product>, StoreError> {
        let rows: Vec<(Json<Product>,)> = sqlx::query_as(
            "SELECT doc FROM products WHERE ($1::text IS NULL OR category_slug = $1) ORDER BY created_at",
        )
        .bind(category_slug)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(doc,)| doc.0).collect())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row: Option<(Json<Product>,)> = sqlx::query_as("SELECT doc FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(doc,)| doc.0))
    }

    async fn insert_products(&self, products: &[Product]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for product in products {
            sqlx::query("INSERT INTO products (id, category_slug, doc, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)")
                .bind(product.id)
                .bind(slugify(&product.category))
                .bind(Json(product))
                .bind(product.created_at)
                .bind(product.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_unique_violation(e, "a product with that id already exists"))?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE products SET category_slug = $2, doc = $3, updated_at = $4 WHERE id = $1")
            .bind(product.id)
            .bind(slugify(&product.category))
            .bind(Json(product))
            .bind(product.updated_at)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected())
    }

    async fn delete_product(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        expect_row(result.rows_affected())
    }

    async fn cart_items(&self, user_id: &str) -> Result<Vec<CartItem>, StoreError> {
        let rows: Vec<CartRow> = sqlx::query_as(&format!("SELECT {CART_COLUMNS} FROM cart_items WHERE user_id = $1 ORDER BY added_at"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CartRow::into_item).collect())
    }

    async fn add_cart_item(&self, item: &CartItem) -> Result<CartItem, StoreError> {
        let row: CartRow = sqlx::query_as(&format!(
            "INSERT INTO cart_items (id, user_id, product_id, line_key, quantity, doc, added_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) \
             ON CONFLICT (user_id, product_id, line_key) DO UPDATE \
             SET quantity = cart_items.quantity + EXCLUDED.quantity, doc = EXCLUDED.doc, updated_at = EXCLUDED.updated_at \
             RETURNING {CART_COLUMNS}"
        ))
        .bind(item.id)
        .bind(&item.user_id)
        .bind(item.product.product_id)
        .bind(item.line_key())
        .bind(quantity_param(item.quantity))
        .bind(Json(item))
        .bind(item.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_item())
    }

    async fn set_cart_quantity(&self, user_id: &str, item_id: Uuid, quantity: u32) -> Result<Option<CartItem>, StoreError> {
        if quantity == 0 {
            self.remove_cart_item(user_id, item_id).await?;
            return Ok(None);
        }
        let row: Option<CartRow> = sqlx::query_as(&format!(
            "UPDATE cart_items SET quantity = $3, updated_at = NOW() WHERE user_id = $1 AND id = $2 RETURNING {CART_COLUMNS}"
        ))
        .bind(user_id)
        .bind(item_id)
        .bind(quantity_param(quantity))
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Some(r.into_item())).ok_or(StoreError::NotFound)
    }

    async fn remove_cart_item(&self, user_id: &str, item_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected())
    }

    async fn clear_cart(&self, user_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO orders (id, user_id, status, doc, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(order.id)
            .bind(&order.user_id)
            .bind(order.status.as_str())
            .bind(Json(order))
            .bind(order.created_at)
            .bind(order.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<(Json<Order>,)> = sqlx::query_as("SELECT doc FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(doc,)| doc.0))
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<(Json<Order>,)> = sqlx::query_as(
            "SELECT doc FROM orders WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(doc,)| doc.0).collect())
    }

    async fn orders_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<(Json<Order>,)> = sqlx::query_as(
            "SELECT doc FROM orders WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(doc,)| doc.0).collect())
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $2, doc = $3, updated_at = $4 WHERE id = $1")
            .bind(order.id)
            .bind(order.status.as_str())
            .bind(Json(order))
            .bind(order.updated_at)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected())
    }
}
