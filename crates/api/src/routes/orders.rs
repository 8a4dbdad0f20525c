//! Customer-facing order endpoints: checkout, reads and cancellation.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartLineId, OrderId, OrderItemId, PaymentMethod, ShippingAddress};
use domain::{OrderView, PlaceOrder};
use serde::Deserialize;
use store::CommerceStore;

use super::parse_id;
use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub line_ids: Vec<CartLineId>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// POST /orders: check out the selected cart lines.
#[tracing::instrument(skip(state, caller, req))]
pub async fn place<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderView>), ApiError> {
    let order = state
        .orders
        .place_order(PlaceOrder {
            customer_id: caller.customer_id,
            line_ids: req.line_ids,
            shipping_address: req.shipping_address,
            payment_method: req.payment_method,
            payment_reference: req.payment_reference,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders: the caller's orders, newest first.
#[tracing::instrument(skip(state, caller))]
pub async fn list<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    Ok(Json(state.orders.list_orders(caller.customer_id).await?))
}

/// GET /orders/:id
#[tracing::instrument(skip(state, caller))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    Ok(Json(state.orders.get_order(&caller, order_id).await?))
}

/// PUT /orders/:id/cancel
#[tracing::instrument(skip(state, caller))]
pub async fn cancel<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    Ok(Json(state.authority.cancel_order(&caller, order_id).await?))
}

/// PUT /orders/:id/items/:item_id/cancel
#[tracing::instrument(skip(state, caller))]
pub async fn cancel_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path((id, item_id)): Path<(String, String)>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let item_id: OrderItemId = parse_id(&item_id, "order item")?;
    let order = state
        .authority
        .cancel_item(&caller, order_id, item_id)
        .await?;
    Ok(Json(order))
}
