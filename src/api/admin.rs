use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::middleware::RequestId;
use crate::catalog::Page;
use crate::domain::aggregates::{Category, Order, OrderStatus, Product, ProductDetails};
use crate::import::{self, ImageIndex, ImportReport};
use crate::media::UploadedImage;
use crate::shop::CategoryDraft;
use crate::CommerceError;

use super::{created, map_commerce_error, ok, validate_body, ApiError, ApiResponse, AppState};

/// Body for creating or replacing a product, in either shape.
#[derive(Debug, Deserialize, Validate)]
pub(super) struct ProductRequest {
    #[validate(length(min = 1, max = 200))]
    name: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    description: String,
    #[validate(length(min = 1, max = 100))]
    category: String,
    #[serde(default)]
    subcategory: Option<String>,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    rating: Decimal,
    #[serde(default)]
    review_count: u32,
    #[serde(default)]
    featured: bool,
    #[serde(flatten)]
    details: ProductDetails,
}

impl ProductRequest {
    fn into_product(self) -> Product {
        let mut product = Product::create(self.name.trim(), self.category.trim(), self.details);
        product.description = self.description;
        product.subcategory = self.subcategory.filter(|s| !s.trim().is_empty());
        product.images = self.images;
        product.rating = self.rating;
        product.review_count = self.review_count;
        product.featured = self.featured;
        product
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(super) struct CategoryRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    #[validate(url)]
    image: Option<String>,
    #[serde(default)]
    subcategories: Vec<String>,
}

impl From<CategoryRequest> for CategoryDraft {
    fn from(r: CategoryRequest) -> Self {
        Self { name: r.name, description: r.description, image: r.image, subcategories: r.subcategories }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct OrderListQuery {
    status: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusRequest {
    status: String,
}

fn parse_status(request_id: &str, raw: &str) -> Result<OrderStatus, ApiError> {
    OrderStatus::parse(raw).ok_or_else(|| ApiError::new(request_id, "bad_request", format!("unknown order status '{raw}'")))
}

// -----------------------------------------------------------------------------
// Products
// -----------------------------------------------------------------------------

pub(super) async fn create_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>), ApiError> {
    validate_body(&req_id.0, &body)?;
    let product = state.shop.create_product(body.into_product()).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(created(req_id.0, product))
}

pub(super) async fn update_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(body): Json<ProductRequest>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    validate_body(&req_id.0, &body)?;
    let product = state.shop.update_product(id, body.into_product()).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, product))
}

pub(super) async fn delete_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.shop.delete_product(id).await.map_err(|e| map_commerce_error(req_id.0, e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn migrate_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    let product = state.shop.migrate_product(id).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, product))
}

// -----------------------------------------------------------------------------
// Categories
// -----------------------------------------------------------------------------

pub(super) async fn create_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Category>>), ApiError> {
    validate_body(&req_id.0, &body)?;
    let category = state.shop.create_category(body.into()).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(created(req_id.0, category))
}

pub(super) async fn update_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(body): Json<CategoryRequest>,
) -> Result<Json<ApiResponse<Category>>, ApiError> {
    validate_body(&req_id.0, &body)?;
    let category = state.shop.update_category(id, body.into()).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, category))
}

pub(super) async fn delete_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.shop.delete_category(id).await.map_err(|e| map_commerce_error(req_id.0, e))?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Orders
// -----------------------------------------------------------------------------

pub(super) async fn list_orders(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ApiResponse<Page<Order>>>, ApiError> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_status(&req_id.0, raw)?),
        None => None,
    };
    let page = state.shop.orders(status, query.page, query.per_page).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, page))
}

pub(super) async fn get_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let order = state.shop.order(id).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, order))
}

pub(super) async fn update_order_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let status = parse_status(&req_id.0, &body.status)?;
    let order = state.shop.update_order_status(id, status).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, order))
}

// -----------------------------------------------------------------------------
// Uploads
// -----------------------------------------------------------------------------

struct UploadedFile {
    field: String,
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Drains a multipart body. Parts without a file name are skipped.
async fn read_files(request_id: &str, mut multipart: Multipart) -> Result<Vec<UploadedFile>, ApiError> {
    let bad = |e: axum::extract::multipart::MultipartError| ApiError::new(request_id, "bad_request", e.to_string());
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let Some(filename) = field.file_name().map(str::to_owned) else { continue };
        let name = field.name().unwrap_or_default().to_owned();
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.map_err(bad)?.to_vec();
        files.push(UploadedFile { field: name, filename, content_type, bytes });
    }
    Ok(files)
}

/// Splits the CSV part (field `file`, or any `.csv`) from image parts.
fn split_import(request_id: &str, files: Vec<UploadedFile>) -> Result<(Vec<u8>, Vec<UploadedFile>), ApiError> {
    let (csv, images): (Vec<_>, Vec<_>) = files
        .into_iter()
        .partition(|f| f.field == "file" || f.filename.to_lowercase().ends_with(".csv"));
    let csv = csv
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::new(request_id, "bad_request", "multipart body has no CSV file"))?;
    Ok((csv.bytes, images))
}

async fn upload_all(state: &AppState, files: Vec<UploadedFile>) -> Result<Vec<UploadedImage>, CommerceError> {
    if files.is_empty() { return Ok(vec![]); }
    let cdn = state.cdn.as_ref().ok_or(CommerceError::CdnUnavailable)?;
    let mut uploaded = Vec::with_capacity(files.len());
    for file in files {
        uploaded.push(cdn.upload(&file.filename, file.content_type.as_deref(), file.bytes).await?);
    }
    tracing::info!(count = uploaded.len(), "images uploaded");
    Ok(uploaded)
}

pub(super) async fn import_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ImportReport>>, ApiError> {
    let files = read_files(&req_id.0, multipart).await?;
    let (csv, images) = split_import(&req_id.0, files)?;
    import::check_headers(&csv).map_err(|e| map_commerce_error(req_id.0.clone(), e.into()))?;
    let uploaded = upload_all(&state, images).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    let index: ImageIndex = uploaded.into_iter().map(|img| (img.filename, img.secure_url)).collect();
    let report = state.shop.import_products(&csv, &index, false).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, report))
}

/// Validates an import without uploading images or writing products. Image
/// references resolve to the attached file names.
pub(super) async fn preview_import(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ImportReport>>, ApiError> {
    let files = read_files(&req_id.0, multipart).await?;
    let (csv, images) = split_import(&req_id.0, files)?;
    let index: ImageIndex = images.iter().map(|f| (f.filename.as_str(), f.filename.clone())).collect();
    let report = state.shop.import_products(&csv, &index, true).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, report))
}

pub(super) async fn upload_images(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<Vec<UploadedImage>>>, ApiError> {
    let files = read_files(&req_id.0, multipart).await?;
    if files.is_empty() {
        return Err(ApiError::new(req_id.0, "bad_request", "no files in upload"));
    }
    let uploaded = upload_all(&state, files).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, uploaded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_request_accepts_either_shape() {
        let legacy: ProductRequest = serde_json::from_value(serde_json::json!({
            "name": "Mug", "category": "Kitchen", "shape": "legacy", "price": 12.5, "sizes": [], "colors": ["red"]
        }))
        .expect("legacy body");
        assert!(legacy.validate().is_ok());
        assert!(legacy.into_product().is_legacy());

        let enhanced: ProductRequest = serde_json::from_value(serde_json::json!({
            "name": "Mug", "category": "Kitchen", "shape": "enhanced", "base_price": 12.5, "base_stock": 4,
            "attributes": [], "variants": []
        }))
        .expect("enhanced body");
        assert!(enhanced.into_product().is_enhanced());
    }

    #[test]
    fn blank_names_fail_validation() {
        let request: ProductRequest = serde_json::from_value(serde_json::json!({
            "name": "", "category": "Kitchen", "shape": "legacy", "price": 1.0
        }))
        .expect("body");
        assert!(request.validate().is_err());
    }

    #[test]
    fn csv_part_is_found_by_field_or_extension() {
        let file = |field: &str, filename: &str| UploadedFile {
            field: field.into(), filename: filename.into(), content_type: None, bytes: filename.as_bytes().to_vec(),
        };
        let (csv, images) = split_import("r", vec![file("images", "lamp.jpg"), file("upload", "Products.CSV")]).expect("split");
        assert_eq!(csv, b"Products.CSV");
        assert_eq!(images.len(), 1);
        assert!(split_import("r", vec![file("images", "lamp.jpg")]).is_err());
    }
}
