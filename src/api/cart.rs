use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;
use validator::Validate;

use crate::api::middleware::RequestId;
use crate::domain::aggregates::{Address, CartItem, CartSummary, Order};
use crate::domain::events::DomainEvent;
use crate::shop::AddToCart;

use super::{created, map_commerce_error, ok, validate_body, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize, Validate)]
pub(super) struct UpdateQuantity {
    #[validate(range(max = 999))]
    quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub(super) struct CheckoutRequest {
    #[validate(email)]
    email: String,
    #[serde(default)]
    shipping_address: Option<Address>,
}

#[derive(Debug, Serialize)]
pub(super) struct QuantityUpdate {
    item_id: Uuid,
    /// `None` when the line was removed.
    item: Option<CartItem>,
}

pub(super) async fn get_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<CartSummary>>, ApiError> {
    let cart = state.shop.cart(&user_id).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, cart))
}

pub(super) async fn add_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(user_id): Path<String>,
    Json(body): Json<AddToCart>,
) -> Result<(StatusCode, Json<ApiResponse<CartItem>>), ApiError> {
    validate_body(&req_id.0, &body)?;
    let item = state.shop.add_to_cart(&user_id, body).await.map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(created(req_id.0, item))
}

pub(super) async fn update_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((user_id, item_id)): Path<(String, Uuid)>,
    Json(body): Json<UpdateQuantity>,
) -> Result<Json<ApiResponse<QuantityUpdate>>, ApiError> {
    validate_body(&req_id.0, &body)?;
    let item = state
        .shop
        .update_cart_item(&user_id, item_id, body.quantity)
        .await
        .map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(ok(req_id.0, QuantityUpdate { item_id, item }))
}

pub(super) async fn remove_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((user_id, item_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state.shop.remove_cart_item(&user_id, item_id).await.map_err(|e| map_commerce_error(req_id.0, e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn clear_cart(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.shop.clear_cart(&user_id).await.map_err(|e| map_commerce_error(req_id.0, e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn checkout(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(user_id): Path<String>,
    Json(body): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), ApiError> {
    validate_body(&req_id.0, &body)?;
    let order = state
        .shop
        .checkout(&user_id, &body.email, body.shipping_address)
        .await
        .map_err(|e| map_commerce_error(req_id.0.clone(), e))?;
    Ok(created(req_id.0, order))
}

/// Server-sent events for one user's cart and order changes.
pub(super) async fn cart_events(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(user_id = %user_id, "cart event subscriber connected");
    let stream = BroadcastStream::new(state.shop.feed().subscribe()).filter_map(move |message| match message {
        Ok(event) if event.user_id() == Some(user_id.as_str()) => to_sse(&event).map(Ok),
        Ok(_) => None,
        Err(lagged) => {
            tracing::warn!(user_id = %user_id, error = %lagged, "cart event subscriber lagged");
            None
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse(event: &DomainEvent) -> Option<Event> {
    let encoded = match event {
        DomainEvent::Cart { change, .. } => Event::default().event("cart").json_data(change),
        DomainEvent::Order { .. } => Event::default().event("order").json_data(event),
        DomainEvent::Product { .. } | DomainEvent::Category { .. } => return None,
    };
    encoded.map_err(|e| tracing::warn!(error = %e, "could not encode cart event")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{CartChange, OrderStatus};

    #[test]
    fn only_shopper_events_become_sse() {
        let cart = DomainEvent::Cart { user_id: "u1".into(), change: CartChange::Cleared };
        let order = DomainEvent::Order { order_id: Uuid::now_v7(), user_id: "u1".into(), status: OrderStatus::Pending };
        let product = DomainEvent::Product { product_id: Uuid::now_v7(), change: crate::domain::events::RecordChange::Created };
        assert!(to_sse(&cart).is_some());
        assert!(to_sse(&order).is_some());
        assert!(to_sse(&product).is_none());
    }

    #[test]
    fn checkout_requires_a_valid_email() {
        let body = CheckoutRequest { email: "nope".into(), shipping_address: None };
        assert!(body.validate().is_err());
        let body = CheckoutRequest { email: "shopper@example.com".into(), shipping_address: None };
        assert!(body.validate().is_ok());
    }
}
