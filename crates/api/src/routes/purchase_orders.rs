//! Purchase-order endpoints. Receipts run through the receiving flow so
//! stock is added in the same request.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::SupplierId;
use domain::{
    CreatePurchaseOrder, Money, NewPurchaseOrderLine, PurchaseOrder, PurchaseOrderLine,
    PurchaseOrderStatus,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_aggregate_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreatePurchaseOrderRequest {
    pub order_number: String,
    pub supplier_id: SupplierId,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[serde(default)]
    pub lines: Vec<NewPurchaseOrderLine>,
}

#[derive(Deserialize)]
pub struct UpdateDetailsRequest {
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateLineRequest {
    pub quantity: u32,
    pub unit_price: Money,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: PurchaseOrderStatus,
}

#[derive(Deserialize)]
pub struct ReceiptRequest {
    pub quantity: i64,
}

#[derive(Serialize)]
pub struct ReceiptResponse {
    pub purchase_order: PurchaseOrder,
    pub line: PurchaseOrderLine,
    pub quantity: u32,
    pub previous_status: PurchaseOrderStatus,
}

/// POST /purchase-orders
#[tracing::instrument(skip(state, req), fields(order_number = %req.order_number))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreatePurchaseOrderRequest>,
) -> Result<(StatusCode, Json<PurchaseOrder>), ApiError> {
    let mut cmd = CreatePurchaseOrder::new(req.order_number, req.supplier_id, req.lines);
    cmd.expected_delivery_date = req.expected_delivery_date;
    cmd.notes = req.notes;

    let po = state.receiving.purchase_orders().create(cmd).await?;
    Ok((StatusCode::CREATED, Json(po)))
}

/// GET /purchase-orders/{id}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let id = parse_aggregate_id(&id)?;
    Ok(Json(state.receiving.purchase_orders().get(id).await?))
}

/// GET /purchase-orders/by-number/{number}
pub async fn by_number<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(number): Path<String>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    state
        .receiving
        .purchase_orders()
        .find_by_number(&number)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("purchase order {number} not found")))
}

/// PUT /purchase-orders/{id}
pub async fn update_details<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDetailsRequest>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let id = parse_aggregate_id(&id)?;
    let po = state
        .receiving
        .purchase_orders()
        .update_details(id, req.expected_delivery_date, req.notes)
        .await?;
    Ok(Json(po))
}

/// POST /purchase-orders/{id}/lines
pub async fn add_line<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(line): Json<NewPurchaseOrderLine>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let id = parse_aggregate_id(&id)?;
    Ok(Json(state.receiving.purchase_orders().add_line(id, line).await?))
}

/// PUT /purchase-orders/{id}/lines/{line_id}
pub async fn update_line<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, line_id)): Path<(String, String)>,
    Json(req): Json<UpdateLineRequest>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let id = parse_aggregate_id(&id)?;
    let line_id = parse_line_id(&line_id)?;
    let po = state
        .receiving
        .purchase_orders()
        .update_line(id, line_id, req.quantity, req.unit_price)
        .await?;
    Ok(Json(po))
}

/// DELETE /purchase-orders/{id}/lines/{line_id}
pub async fn remove_line<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, line_id)): Path<(String, String)>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let id = parse_aggregate_id(&id)?;
    let line_id = parse_line_id(&line_id)?;
    Ok(Json(
        state.receiving.purchase_orders().remove_line(id, line_id).await?,
    ))
}

/// PUT /purchase-orders/{id}/status
#[tracing::instrument(skip(state, req), fields(status = %req.status))]
pub async fn update_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let id = parse_aggregate_id(&id)?;
    let po = state
        .receiving
        .purchase_orders()
        .change_status(id, req.status)
        .await?;
    Ok(Json(po))
}

/// POST /purchase-orders/{id}/lines/{line_id}/receipts
#[tracing::instrument(skip(state, req), fields(quantity = req.quantity))]
pub async fn receive<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, line_id)): Path<(String, String)>,
    Json(req): Json<ReceiptRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let id = parse_aggregate_id(&id)?;
    let line_id = parse_line_id(&line_id)?;
    let outcome = state.receiving.receive(id, line_id, req.quantity).await?;
    Ok(Json(ReceiptResponse {
        purchase_order: outcome.purchase_order,
        line: outcome.line,
        quantity: outcome.quantity,
        previous_status: outcome.previous_status,
    }))
}

fn parse_line_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|e| ApiError::BadRequest(format!("Invalid line ID: {e}")))
}
