//! Storefront operations.
//!
//! [`Shop`] applies the business rules on top of a [`CommerceStore`] and
//! publishes every change on the [`ChangeFeed`]. HTTP handlers are thin
//! wrappers around these methods.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::analytics::{self, DateRange, SalesReport};
use crate::catalog::{self, CatalogQuery, Page};
use crate::domain::aggregates::{
    Address, Cart, CartChange, CartItem, CartSummary, Category, Order, OrderStatus, Product, ProductVariant,
};
use crate::domain::events::{DomainEvent, RecordChange};
use crate::domain::value_objects::{slugify, AttributeSelection, Quantity, QuantityError};
use crate::feed::ChangeFeed;
use crate::import::{self, ImageIndex, ImportReport, DEFAULT_BATCH_SIZE};
use crate::store::{CommerceStore, StoreError};
use crate::{CommerceError, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddToCart {
    pub product_id: Uuid,
    #[serde(default = "one")]
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
    #[serde(default)]
    pub selected_attributes: AttributeSelection,
    /// Picks a variant directly instead of by selection.
    #[serde(default)]
    pub variant_id: Option<String>,
}

fn one() -> u32 { 1 }

/// Editable category fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub subcategories: Vec<String>,
}

#[derive(Clone)]
pub struct Shop {
    store: Arc<dyn CommerceStore>,
    feed: ChangeFeed,
    import_batch_size: usize,
}

fn missing(err: StoreError, not_found: CommerceError) -> CommerceError {
    match err {
        StoreError::NotFound => not_found,
        StoreError::Conflict(message) => CommerceError::Conflict(message),
        other => CommerceError::Storage(other),
    }
}

fn check_product(product: &Product) -> Result<()> {
    product.validate().map_err(|issues| CommerceError::Validation(issues.iter().map(ToString::to_string).collect()))
}

impl Shop {
    pub fn new(store: Arc<dyn CommerceStore>, feed: ChangeFeed) -> Self {
        Self { store, feed, import_batch_size: DEFAULT_BATCH_SIZE }
    }

    pub fn with_import_batch_size(mut self, size: usize) -> Self {
        self.import_batch_size = size.max(1);
        self
    }

    pub fn store(&self) -> &dyn CommerceStore { self.store.as_ref() }
    pub fn feed(&self) -> &ChangeFeed { &self.feed }

    // -------------------------------------------------------------------------
    // Catalog
    // -------------------------------------------------------------------------

    pub async fn categories(&self) -> Result<Vec<Category>> { Ok(self.store.list_categories().await?) }

    /// Looks a category up by id, or by slug when `key` is not a UUID.
    pub async fn category(&self, key: &str) -> Result<Category> {
        let found = match Uuid::parse_str(key) {
            Ok(id) => self.store.get_category(id).await?,
            Err(_) => self.store.find_category_by_slug(&slugify(key)).await?,
        };
        found.ok_or(CommerceError::CategoryNotFound)
    }

    pub async fn products(&self, query: &CatalogQuery) -> Result<Page<Product>> {
        let slug = query.category.as_deref().map(slugify).filter(|s| !s.is_empty());
        let products = self.store.list_products(slug.as_deref()).await?;
        Ok(query.apply(products))
    }

    pub async fn product(&self, id: Uuid) -> Result<Product> {
        self.store.get_product(id).await?.ok_or(CommerceError::ProductNotFound)
    }

    // -------------------------------------------------------------------------
    // Cart
    // -------------------------------------------------------------------------

    pub async fn cart(&self, user_id: &str) -> Result<CartSummary> {
        let items = self.store.cart_items(user_id).await?;
        Ok(Cart::from_items(user_id, items).summary())
    }

    /// Adds units to the user's cart, merging with an existing line for the
    /// same product and line key.
    pub async fn add_to_cart(&self, user_id: &str, request: AddToCart) -> Result<CartItem> {
        let quantity = Quantity::for_line(request.quantity)?;
        let product = self.product(request.product_id).await?;
        let selection = request.selected_attributes;

        let variant = pick_variant(&product, request.variant_id.as_deref(), &selection)?;
        if variant.is_none() && !selection.is_empty() && !product.accepts_selection(&selection) {
            return Err(CommerceError::InvalidSelection);
        }

        let (in_stock, available) = match variant {
            Some(v) => (v.inventory > 0, Some(v.inventory)),
            None => (product.is_in_stock(&selection), product.available_quantity(&selection)),
        };
        if !in_stock { return Err(CommerceError::OutOfStock); }

        let item = CartItem::for_product(user_id, &product, variant, selection, quantity.value());
        let items = self.store.cart_items(user_id).await?;
        let cart = Cart::from_items(user_id, items);
        let already = cart.find_line(product.id, &item.line_key()).map_or(0, |l| l.quantity);
        let line_total = quantity.add(already);
        if line_total.exceeds_line_limit() { return Err(QuantityError::TooLarge.into()); }
        if let Some(available) = available {
            if line_total.value() > available {
                return Err(CommerceError::InsufficientInventory { available });
            }
        }

        let stored = self.store.add_cart_item(&item).await?;
        tracing::info!(user_id, product_id = %product.id, variant = ?stored.variant_id, quantity = stored.quantity, "cart line added");
        self.publish_cart(user_id, CartChange::Upserted { item: stored.clone() }).await;
        Ok(stored)
    }

    /// Sets a line's quantity; zero removes the line and returns `None`.
    pub async fn update_cart_item(&self, user_id: &str, item_id: Uuid, quantity: u32) -> Result<Option<CartItem>> {
        if Quantity::new(quantity).exceeds_line_limit() { return Err(QuantityError::TooLarge.into()); }
        if quantity > 0 {
            let items = self.store.cart_items(user_id).await?;
            let line = items.iter().find(|i| i.id == item_id).ok_or(CommerceError::CartItemNotFound)?;
            if let Some(product) = self.store.get_product(line.product.product_id).await? {
                let available = match line.variant_id.as_deref().and_then(|id| product.variant(id)) {
                    Some(v) => Some(v.inventory),
                    None => product.available_quantity(&line.selected_attributes),
                };
                if let Some(available) = available {
                    if quantity > available { return Err(CommerceError::InsufficientInventory { available }); }
                }
            }
        }

        let updated = self.store
            .set_cart_quantity(user_id, item_id, quantity)
            .await
            .map_err(|e| missing(e, CommerceError::CartItemNotFound))?;
        let change = match &updated {
            Some(item) => CartChange::Upserted { item: item.clone() },
            None => CartChange::Removed { item_id },
        };
        self.publish_cart(user_id, change).await;
        Ok(updated)
    }

    pub async fn remove_cart_item(&self, user_id: &str, item_id: Uuid) -> Result<()> {
        self.store
            .remove_cart_item(user_id, item_id)
            .await
            .map_err(|e| missing(e, CommerceError::CartItemNotFound))?;
        self.publish_cart(user_id, CartChange::Removed { item_id }).await;
        Ok(())
    }

    pub async fn clear_cart(&self, user_id: &str) -> Result<()> {
        self.store.clear_cart(user_id).await?;
        self.publish_cart(user_id, CartChange::Cleared).await;
        Ok(())
    }

    /// Turns the user's cart into a pending order priced at current catalog
    /// prices, then empties the cart.
    pub async fn checkout(&self, user_id: &str, email: &str, shipping_address: Option<Address>) -> Result<Order> {
        let mut items = self.store.cart_items(user_id).await?;
        if items.is_empty() { return Err(CommerceError::EmptyCart); }

        for item in &mut items {
            let product = self.product(item.product.product_id).await?;
            let variant = item.variant_id.as_deref().and_then(|id| product.variant(id));
            let (in_stock, price) = match variant {
                Some(v) => (v.inventory > 0, v.price),
                None => (product.is_in_stock(&item.selected_attributes), product.current_price(&item.selected_attributes)),
            };
            if !in_stock { return Err(CommerceError::OutOfStock); }
            item.unit_price = price;
            item.product.name = product.name.clone();
            item.product.category = product.category.clone();
        }

        let mut order = Order::from_cart(user_id, email, &items)?;
        order.shipping_address = shipping_address;
        self.store.insert_order(&order).await?;
        self.store.clear_cart(user_id).await?;
        tracing::info!(order_id = %order.id, user_id, total = %order.total.amount(), lines = order.items.len(), "order placed");

        self.publish_cart(user_id, CartChange::Cleared).await;
        self.publish_order(&order).await;
        Ok(order)
    }

    // -------------------------------------------------------------------------
    // Admin: products and categories
    // -------------------------------------------------------------------------

    pub async fn create_product(&self, mut product: Product) -> Result<Product> {
        let now = Utc::now();
        product.id = Uuid::now_v7();
        product.created_at = now;
        product.updated_at = now;
        check_product(&product)?;
        self.store.insert_product(&product).await.map_err(|e| missing(e, CommerceError::ProductNotFound))?;
        tracing::info!(product_id = %product.id, enhanced = product.is_enhanced(), "product created");
        self.publish_product(product.id, RecordChange::Created).await;
        Ok(product)
    }

    /// Replaces a product's contents, keeping its id and creation time.
    pub async fn update_product(&self, id: Uuid, mut product: Product) -> Result<Product> {
        let existing = self.product(id).await?;
        product.id = existing.id;
        product.created_at = existing.created_at;
        product.touch();
        check_product(&product)?;
        self.store.update_product(&product).await.map_err(|e| missing(e, CommerceError::ProductNotFound))?;
        self.publish_product(id, RecordChange::Updated).await;
        Ok(product)
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        self.store.delete_product(id).await.map_err(|e| missing(e, CommerceError::ProductNotFound))?;
        tracing::info!(product_id = %id, "product deleted");
        self.publish_product(id, RecordChange::Deleted).await;
        Ok(())
    }

    /// Rewrites a legacy product in the enhanced shape. Already-enhanced
    /// products are returned as they are.
    pub async fn migrate_product(&self, id: Uuid) -> Result<Product> {
        let product = self.product(id).await?;
        if product.is_enhanced() { return Ok(product); }
        let migrated = product.to_enhanced();
        check_product(&migrated)?;
        self.store.update_product(&migrated).await.map_err(|e| missing(e, CommerceError::ProductNotFound))?;
        tracing::info!(product_id = %id, variants = migrated.variants().len(), "product migrated to variants");
        self.publish_product(id, RecordChange::Migrated).await;
        Ok(migrated)
    }

    pub async fn create_category(&self, draft: CategoryDraft) -> Result<Category> {
        let mut category = Category::create(draft.name.trim(), draft.description);
        if category.slug.is_empty() {
            return Err(CommerceError::Validation(vec!["name must contain letters or digits".into()]));
        }
        category.image = draft.image;
        category.set_subcategories(&draft.subcategories);
        self.store.insert_category(&category).await.map_err(|e| missing(e, CommerceError::CategoryNotFound))?;
        self.publish_category(category.id, RecordChange::Created).await;
        Ok(category)
    }

    pub async fn update_category(&self, id: Uuid, draft: CategoryDraft) -> Result<Category> {
        let mut category = self.store.get_category(id).await?.ok_or(CommerceError::CategoryNotFound)?;
        let old_slug = category.slug.clone();
        category.rename(draft.name.trim());
        if category.slug.is_empty() {
            return Err(CommerceError::Validation(vec!["name must contain letters or digits".into()]));
        }
        if category.slug != old_slug {
            let in_use = self.store.list_products(Some(&old_slug)).await?.len();
            if in_use > 0 {
                return Err(CommerceError::Conflict(format!("category '{old_slug}' still has {in_use} products; move them before renaming")));
            }
        }
        category.description = draft.description;
        category.image = draft.image;
        category.set_subcategories(&draft.subcategories);
        self.store.update_category(&category).await.map_err(|e| missing(e, CommerceError::CategoryNotFound))?;
        self.publish_category(id, RecordChange::Updated).await;
        Ok(category)
    }

    /// Refuses to delete a category that products still belong to.
    pub async fn delete_category(&self, id: Uuid) -> Result<()> {
        let category = self.store.get_category(id).await?.ok_or(CommerceError::CategoryNotFound)?;
        let in_use = self.store.list_products(Some(&category.slug)).await?.len();
        if in_use > 0 {
            return Err(CommerceError::Conflict(format!("category '{}' still has {in_use} products", category.name)));
        }
        self.store.delete_category(id).await.map_err(|e| missing(e, CommerceError::CategoryNotFound))?;
        self.publish_category(id, RecordChange::Deleted).await;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Admin: orders, import, analytics
    // -------------------------------------------------------------------------

    pub async fn orders(&self, status: Option<OrderStatus>, page: Option<u32>, per_page: Option<u32>) -> Result<Page<Order>> {
        let orders = self.store.list_orders(status).await?;
        Ok(catalog::paginate(orders, page, per_page))
    }

    pub async fn order(&self, id: Uuid) -> Result<Order> {
        self.store.get_order(id).await?.ok_or(CommerceError::OrderNotFound)
    }

    pub async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> Result<Order> {
        let mut order = self.order(id).await?;
        let from = order.status;
        order.transition(status)?;
        if from == order.status { return Ok(order); }
        self.store.update_order(&order).await.map_err(|e| missing(e, CommerceError::OrderNotFound))?;
        tracing::info!(order_id = %id, from = from.as_str(), to = status.as_str(), "order status changed");
        self.publish_order(&order).await;
        Ok(order)
    }

    /// Parses a CSV upload and, unless `dry_run`, writes the valid rows.
    pub async fn import_products(&self, csv: &[u8], images: &ImageIndex, dry_run: bool) -> Result<ImportReport> {
        let parsed = import::parse_products(csv, images)?;
        if dry_run { return Ok(parsed.preview()); }
        let report = import::write_batches(self.store.as_ref(), parsed, self.import_batch_size).await;
        for outcome in &report.outcomes {
            if let import::RowOutcome::Imported { product_id, .. } = outcome {
                self.publish_product(*product_id, RecordChange::Created).await;
            }
        }
        Ok(report)
    }

    pub async fn sales_report(&self, range: DateRange) -> Result<SalesReport> {
        let (start, end) = range.bounds();
        let orders = self.store.orders_between(start, end).await?;
        Ok(analytics::aggregate(&orders, &range))
    }

    // -------------------------------------------------------------------------
    // Change feed
    // -------------------------------------------------------------------------

    async fn publish_cart(&self, user_id: &str, change: CartChange) {
        self.feed.publish(DomainEvent::Cart { user_id: user_id.to_string(), change }).await;
    }

    async fn publish_product(&self, product_id: Uuid, change: RecordChange) {
        self.feed.publish(DomainEvent::Product { product_id, change }).await;
    }

    async fn publish_category(&self, category_id: Uuid, change: RecordChange) {
        self.feed.publish(DomainEvent::Category { category_id, change }).await;
    }

    async fn publish_order(&self, order: &Order) {
        self.feed.publish(DomainEvent::Order { order_id: order.id, user_id: order.user_id.clone(), status: order.status }).await;
    }
}

/// Variant a cart line should point at. Products without variants yield
/// `None`. An empty selection takes the default (first) variant; a selection
/// no variant satisfies is rejected.
fn pick_variant<'p>(product: &'p Product, variant_id: Option<&str>, selection: &AttributeSelection) -> Result<Option<&'p ProductVariant>> {
    if let Some(id) = variant_id {
        return product.variant(id).map(Some).ok_or(CommerceError::InvalidSelection);
    }
    if product.variants().is_empty() { return Ok(None); }
    if selection.is_empty() { return Ok(product.resolve_variant(selection)); }
    product.matching_variant(selection).map(Some).ok_or(CommerceError::InvalidSelection)
}
