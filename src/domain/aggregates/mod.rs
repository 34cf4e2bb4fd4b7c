//! Aggregates module
pub mod product;
pub mod category;
pub mod cart;
pub mod order;

pub use product::{
    AttributeKind, EnhancedDetails, LegacyDetails, Product, ProductAttribute, ProductDetails,
    ProductIssue, ProductVariant,
};
pub use category::{Category, Subcategory};
pub use cart::{Cart, CartChange, CartError, CartItem, CartSummary, ProductSnapshot};
pub use order::{Address, LineItem, Order, OrderError, OrderStatus};
