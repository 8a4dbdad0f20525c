//! Public catalog reads.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{ProductId, VariantId};
use domain::ProductView;
use store::{CommerceStore, VariantRecord};

use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /products
#[tracing::instrument(skip(state))]
pub async fn list_products<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ProductView>>, ApiError> {
    Ok(Json(state.catalog.list_products().await?))
}

/// GET /products/:id
#[tracing::instrument(skip(state))]
pub async fn get_product<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductView>, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    Ok(Json(state.catalog.get_product(product_id).await?))
}

/// GET /variants/:id
#[tracing::instrument(skip(state))]
pub async fn get_variant<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<VariantRecord>, ApiError> {
    let variant_id: VariantId = parse_id(&id, "variant")?;
    Ok(Json(state.catalog.get_variant(variant_id).await?))
}
