//! Stock ledger endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{LocationId, ProductId};
use domain::{StockRecord, StockTransaction, TransactionType};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::parse_aggregate_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateStockRequest {
    pub product_id: ProductId,
    pub location_id: LocationId,
    #[serde(default)]
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct TransactionRequest {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub quantity: i64,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Serialize)]
pub struct ProductStockResponse {
    pub product_id: ProductId,
    pub total: i64,
    pub available: i64,
    pub records: Vec<StockRecord>,
}

/// POST /inventory
#[tracing::instrument(skip(state, req))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateStockRequest>,
) -> Result<(StatusCode, Json<StockRecord>), ApiError> {
    let record = state
        .inventory
        .ledger()
        .create(req.product_id, req.location_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /inventory/{id}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<StockRecord>, ApiError> {
    let stock_id = parse_aggregate_id(&id)?;
    Ok(Json(state.inventory.ledger().get(stock_id).await?))
}

/// GET /inventory/{id}/transactions
pub async fn transactions<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StockTransaction>>, ApiError> {
    let stock_id = parse_aggregate_id(&id)?;
    Ok(Json(state.inventory.ledger().transactions(stock_id).await?))
}

/// POST /inventory/{id}/transactions
///
/// `StockIn` and `StockOut` take a positive amount; `Adjustment` takes the
/// new absolute quantity. `Transfer` is rejected.
#[tracing::instrument(skip(state, req), fields(kind = %req.kind, quantity = req.quantity))]
pub async fn record<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<TransactionRequest>,
) -> Result<Json<StockRecord>, ApiError> {
    let stock_id = parse_aggregate_id(&id)?;
    let record = state
        .inventory
        .ledger()
        .apply_transaction(stock_id, req.kind, req.quantity, req.reference, req.notes)
        .await?;
    Ok(Json(record))
}

/// GET /products/{product_id}/stock
pub async fn by_product<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<i64>,
) -> Result<Json<ProductStockResponse>, ApiError> {
    let product_id = ProductId::new(product_id);
    let ledger = state.inventory.ledger();
    let records = ledger.query_by_product(product_id).await?;
    let total = records.iter().map(|r| i64::from(r.quantity())).sum();
    let available = state.inventory.available(product_id).await?;

    Ok(Json(ProductStockResponse {
        product_id,
        total,
        available,
        records,
    }))
}

/// GET /locations/{location_id}/stock
pub async fn by_location<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(location_id): Path<i64>,
) -> Result<Json<Vec<StockRecord>>, ApiError> {
    let records = state
        .inventory
        .ledger()
        .query_by_location(LocationId::new(location_id))
        .await?;
    Ok(Json(records))
}
