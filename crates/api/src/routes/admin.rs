//! Admin endpoints: catalog maintenance and fulfilment.
//!
//! Role checks happen in the domain services; these handlers only parse.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, OrderId, OrderItemId, VariantId};
use domain::{NewProduct, OrderView, ProductView};
use serde::Deserialize;
use store::{CommerceStore, VariantRecord};

use super::{StatusRequest, parse_id, parse_status};
use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct PriceRequest {
    pub marked_price: Money,
    pub selling_price: Money,
}

/// POST /products
#[tracing::instrument(skip(state, caller, req))]
pub async fn create_product<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Json(req): Json<NewProduct>,
) -> Result<(StatusCode, Json<ProductView>), ApiError> {
    let product = state.catalog.create_product(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /variants/:id/stock
#[tracing::instrument(skip(state, caller, req))]
pub async fn restock<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(id): Path<String>,
    Json(req): Json<RestockRequest>,
) -> Result<Json<VariantRecord>, ApiError> {
    let variant_id: VariantId = parse_id(&id, "variant")?;
    let variant = state
        .catalog
        .restock(&caller, variant_id, req.quantity)
        .await?;
    Ok(Json(variant))
}

/// PUT /variants/:id/price
#[tracing::instrument(skip(state, caller, req))]
pub async fn set_price<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(id): Path<String>,
    Json(req): Json<PriceRequest>,
) -> Result<Json<VariantRecord>, ApiError> {
    let variant_id: VariantId = parse_id(&id, "variant")?;
    let variant = state
        .catalog
        .set_price(&caller, variant_id, req.marked_price, req.selling_price)
        .await?;
    Ok(Json(variant))
}

/// GET /allOrders
#[tracing::instrument(skip(state, caller))]
pub async fn list_orders<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    Ok(Json(state.orders.list_all_orders(&caller).await?))
}

/// PUT /allOrders/:id/status: move every non-terminal item.
#[tracing::instrument(skip(state, caller, req))]
pub async fn set_order_status<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let to = parse_status(&req.status)?;
    let order = state
        .authority
        .set_order_status(&caller, order_id, to)
        .await?;
    Ok(Json(order))
}

/// PUT /allOrders/:id/items/:item_id/status
#[tracing::instrument(skip(state, caller, req))]
pub async fn set_item_status<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path((id, item_id)): Path<(String, String)>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let item_id: OrderItemId = parse_id(&item_id, "order item")?;
    let to = parse_status(&req.status)?;
    let order = state
        .authority
        .set_item_status(&caller, order_id, item_id, to)
        .await?;
    Ok(Json(order))
}
