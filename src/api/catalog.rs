use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::api::middleware::RequestId;
use crate::catalog::{CatalogQuery, Page};
use crate::domain::aggregates::{Category, Product};
use crate::domain::value_objects::AttributeSelection;

use super::{map_commerce_error, ok, ApiError, ApiResponse, AppState};

const ATTRIBUTE_PREFIX: &str = "attr.";

/// A product plus the price and stock that apply to one selection.
#[derive(Debug, Serialize)]
pub(super) struct ProductView {
    #[serde(flatten)]
    product: Product,
    pricing: ResolvedPricing,
}

#[derive(Debug, Serialize, PartialEq)]
pub(super) struct ResolvedPricing {
    selection: AttributeSelection,
    /// Variant that matched the selection, if any.
    variant_id: Option<String>,
    /// Variant to display when nothing matched.
    display_variant_id: Option<String>,
    price: Decimal,
    original_price: Option<Decimal>,
    discount_percent: Option<u32>,
    in_stock: bool,
    available_quantity: Option<u32>,
    image: Option<String>,
    price_range: (Decimal, Decimal),
}

impl ResolvedPricing {
    fn for_selection(product: &Product, selection: AttributeSelection) -> Self {
        Self {
            variant_id: product.matching_variant(&selection).map(|v| v.id.clone()),
            display_variant_id: product.resolve_variant(&selection).map(|v| v.id.clone()),
            price: product.current_price(&selection),
            original_price: product.original_price(&selection),
            discount_percent: product.discount_percent(&selection),
            in_stock: product.is_in_stock(&selection),
            available_quantity: product.available_quantity(&selection),
            image: product.primary_image(&selection).map(str::to_owned),
            price_range: product.price_range(),
            selection,
        }
    }
}

/// Collects `attr.<id>=<value>` query pairs into a selection.
fn selection_from_query(params: &HashMap<String, String>) -> AttributeSelection {
    params
        .iter()
        .filter_map(|(key, value)| {
            let attr = key.strip_prefix(ATTRIBUTE_PREFIX)?.trim();
            let value = value.trim();
            (!attr.is_empty() && !value.is_empty()).then(|| (attr.to_owned(), value.to_owned()))
        })
        .collect()
}

pub(super) async fn list_categories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<Category>>>, ApiError> {
    let categories = state.shop.categories().await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, categories))
}

pub(super) async fn get_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<Category>>, ApiError> {
    let category = state.shop.category(&key).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, category))
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<ApiResponse<Page<Product>>>, ApiError> {
    let page = state.shop.products(&query).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, page))
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ApiResponse<ProductView>>, ApiError> {
    let product = state.shop.product(id).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    let pricing = ResolvedPricing::for_selection(&product, selection_from_query(&params));
    Ok(ok(req_id.0, ProductView { product, pricing }))
}
