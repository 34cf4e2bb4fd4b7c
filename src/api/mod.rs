mod admin;
mod analytics;
mod cart;
mod catalog;
pub mod middleware;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use crate::domain::aggregates::OrderError;
use crate::media::{CdnClient, CdnError};
use crate::shop::Shop;
use crate::store::StoreError;
use crate::CommerceError;

use self::middleware::{request_id, require_bearer_auth, AuthState, RequestId};

#[derive(Clone)]
pub struct AppState {
    pub shop: Shop,
    /// `None` when no CDN is configured.
    pub cdn: Option<CdnClient>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    store: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self { request_id, timestamp: Utc::now() }
    }
}

impl ApiError {
    pub fn new(request_id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody { code: code.into(), message: message.into() },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn ok<T: Serialize>(request_id: String, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { data, meta: ResponseMeta::new(request_id) })
}

pub(super) fn created<T: Serialize>(request_id: String, data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, ok(request_id, data))
}

/// Translates a service error into the API envelope. Server-side failures
/// are logged and reported with a generic message.
pub(super) fn map_commerce_error(request_id: String, error: CommerceError) -> ApiError {
    use CommerceError as E;
    let code = match &error {
        E::ProductNotFound | E::CategoryNotFound | E::OrderNotFound | E::CartItemNotFound => "not_found",
        E::OutOfStock
        | E::InsufficientInventory { .. }
        | E::InvalidSelection
        | E::InvalidQuantity(_)
        | E::EmptyCart
        | E::Analytics(_)
        | E::Import(_)
        | E::Order(OrderError::NoItems) => "bad_request",
        E::Validation(_) => "validation_error",
        E::Conflict(_) | E::Order(OrderError::IllegalTransition { .. }) => "conflict",
        E::Storage(StoreError::NotFound) => "not_found",
        E::Storage(StoreError::Conflict(_)) => "conflict",
        E::CdnUnavailable => "unavailable",
        E::Cdn(CdnError::InvalidContentType(_)) => "bad_request",
        E::Cdn(_) | E::Storage(_) => {
            tracing::error!(error = %error, "request failed");
            let message = if matches!(error, E::Cdn(_)) { "image upload failed" } else { "storage operation failed" };
            return ApiError::new(request_id, "internal_error", message);
        }
    };
    ApiError::new(request_id, code, error.to_string())
}

/// Runs `validator` rules on a request body.
pub(super) fn validate_body<T: Validate>(request_id: &str, body: &T) -> Result<(), ApiError> {
    body.validate().map_err(|e| ApiError::new(request_id, "validation_error", e.to_string()))
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, HeaderName::from_static("x-request-id")])
}

fn public_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/categories", get(catalog::list_categories))
        .route("/api/v1/categories/:key", get(catalog::get_category))
        .route("/api/v1/products", get(catalog::list_products))
        .route("/api/v1/products/:id", get(catalog::get_product))
        .route("/api/v1/cart/:user_id", get(cart::get_cart).post(cart::add_item).delete(cart::clear_cart))
        .route("/api/v1/cart/:user_id/items/:item_id", put(cart::update_item).delete(cart::remove_item))
        .route("/api/v1/cart/:user_id/events", get(cart::cart_events))
        .route("/api/v1/checkout/:user_id", post(cart::checkout))
}

fn admin_router(auth: AuthState, max_upload_bytes: usize) -> Router<AppState> {
    let uploads = Router::new()
        .route("/api/v1/admin/import", post(admin::import_products))
        .route("/api/v1/admin/import/preview", post(admin::preview_import))
        .route("/api/v1/admin/images", post(admin::upload_images))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    Router::new()
        .route("/api/v1/admin/products", post(admin::create_product))
        .route("/api/v1/admin/products/:id", put(admin::update_product).delete(admin::delete_product))
        .route("/api/v1/admin/products/:id/migrate", post(admin::migrate_product))
        .route("/api/v1/admin/categories", post(admin::create_category))
        .route("/api/v1/admin/categories/:id", put(admin::update_category).delete(admin::delete_category))
        .route("/api/v1/admin/orders", get(admin::list_orders))
        .route("/api/v1/admin/orders/:id", get(admin::get_order))
        .route("/api/v1/admin/orders/:id/status", put(admin::update_order_status))
        .route("/api/v1/admin/analytics", get(analytics::sales_report))
        .merge(uploads)
        .layer(axum::middleware::from_fn_with_state(auth, require_bearer_auth))
}

pub fn build_app(state: AppState, auth: AuthState, max_upload_bytes: usize) -> Router {
    Router::new()
        .merge(public_router())
        .merge(admin_router(auth, max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>, Extension(req_id): Extension<RequestId>) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);
    let store = state.shop.store();

    match store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse { data: HealthData { status: "ok", store: store.backend() }, meta }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, backend = store.backend(), "health check: store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError {
                    error: ErrorBody { code: "unavailable".into(), message: "store unavailable".into() },
                    meta,
                }),
            )
                .into_response()
        }
    }
}
