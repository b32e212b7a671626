//! Seeds and reads the in-process product catalog.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use domain::Money;
use event_store::EventStore;
use saga::{ProductCatalog, ProductSnapshot, SagaError};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UpsertProductRequest {
    pub name: String,
    pub price: Money,
}

/// PUT /catalog/products/{product_id}
pub async fn upsert<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<i64>,
    Json(req): Json<UpsertProductRequest>,
) -> Result<Json<ProductSnapshot>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("product name is required".into()));
    }
    if req.price.is_negative() {
        return Err(ApiError::BadRequest("price cannot be negative".into()));
    }
    let product_id = ProductId::new(product_id);
    state.catalog.insert(product_id, req.name.clone(), req.price);
    Ok(Json(ProductSnapshot {
        product_id,
        name: req.name,
        price: req.price,
    }))
}

/// GET /catalog/products/{product_id}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<i64>,
) -> Result<Json<ProductSnapshot>, ApiError> {
    let product_id = ProductId::new(product_id);
    let product = state
        .catalog
        .get_product(product_id)
        .await?
        .ok_or(SagaError::ProductNotFound(product_id))?;
    Ok(Json(product))
}
