//! Cart endpoints. Every handler acts on the caller's own cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartLineId, ProductId, VariantId};
use serde::{Deserialize, Serialize};
use store::{CartLineRecord, CommerceStore};

use super::parse_id;
use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct RemoveLinesRequest {
    pub line_ids: Vec<CartLineId>,
}

// -- Response types --

#[derive(Serialize)]
pub struct RemovedResponse {
    pub removed: u64,
}

// -- Handlers --

/// GET /cart
#[tracing::instrument(skip(state, caller))]
pub async fn list<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
) -> Result<Json<Vec<CartLineRecord>>, ApiError> {
    Ok(Json(state.cart.list(caller.customer_id).await?))
}

/// POST /cart: add a variant, merging into an existing line.
#[tracing::instrument(skip(state, caller, req))]
pub async fn add<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<CartLineRecord>, ApiError> {
    let line = state
        .cart
        .add_or_merge(caller.customer_id, req.product_id, req.variant_id, req.quantity)
        .await?;
    Ok(Json(line))
}

/// PUT /cart/:line_id
#[tracing::instrument(skip(state, caller, req))]
pub async fn set_quantity<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(line_id): Path<String>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<Json<CartLineRecord>, ApiError> {
    let line_id = parse_id(&line_id, "cart line")?;
    let line = state
        .cart
        .set_quantity(caller.customer_id, line_id, req.quantity)
        .await?;
    Ok(Json(line))
}

/// DELETE /cart/:line_id
#[tracing::instrument(skip(state, caller))]
pub async fn remove<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Path(line_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let line_id = parse_id(&line_id, "cart line")?;
    state.cart.remove(caller.customer_id, line_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /cart with `{"line_ids": [...]}`
#[tracing::instrument(skip(state, caller, req))]
pub async fn remove_many<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(caller): Identity,
    Json(req): Json<RemoveLinesRequest>,
) -> Result<Json<RemovedResponse>, ApiError> {
    let removed = state
        .cart
        .remove_many(caller.customer_id, &req.line_ids)
        .await?;
    Ok(Json(RemovedResponse { removed }))
}
