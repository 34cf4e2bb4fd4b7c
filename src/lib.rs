//! Storefront commerce service
//!
//! Catalog browsing, carts and checkout for shoppers, plus an admin surface
//! for product and category management, CSV bulk import, image upload to a
//! CDN and sales analytics.
//!
//! ## Layout
//! - [`domain`]: products (legacy and enhanced shapes), categories, carts, orders
//! - [`store`]: persistence behind the [`store::CommerceStore`] trait
//! - [`shop`]: the operations the HTTP layer exposes
//! - [`api`]: axum router, envelopes and middleware

pub mod analytics;
pub mod api;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod feed;
pub mod import;
pub mod media;
pub mod shop;
pub mod store;

use thiserror::Error;

use crate::analytics::AnalyticsError;
use crate::domain::aggregates::OrderError;
use crate::domain::value_objects::QuantityError;
use crate::import::ImportError;
use crate::media::CdnError;
use crate::store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Category not found")]
    CategoryNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Cart item not found")]
    CartItemNotFound,

    #[error("Product is out of stock")]
    OutOfStock,

    #[error("Insufficient inventory: only {available} available")]
    InsufficientInventory { available: u32 },

    #[error("No variant matches the selected options")]
    InvalidSelection,

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(#[from] QuantityError),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{0}")]
    Conflict(String),

    #[error("Image uploads are not configured")]
    CdnUnavailable,

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("Image upload failed: {0}")]
    Cdn(#[from] CdnError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, CommerceError>;
