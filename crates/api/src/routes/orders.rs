//! Customer order endpoints. Placement, line edits and cancellation run
//! through the reservation saga; other edits go straight to the order
//! service.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{AggregateId, ProductId};
use domain::{Address, Order, OrderStatus};
use event_store::EventStore;
use saga::{CancellationToken, PlaceOrderRequest, RequestedLine, ReservationSagaInstance};
use serde::{Deserialize, Serialize};

use super::parse_aggregate_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AddressesRequest {
    pub shipping_address: Address,
    pub billing_address: Address,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Serialize)]
pub struct PlacedOrderResponse {
    pub order: Order,
    pub saga_id: AggregateId,
}

#[derive(Serialize)]
pub struct StatusChangeResponse {
    pub order: Order,
    /// Present when the change was a cancellation that released holds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saga_id: Option<AggregateId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released: Option<usize>,
}

#[derive(Serialize)]
pub struct EventEnvelopeResponse {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub version: i64,
    pub timestamp: String,
    pub payload: serde_json::Value,
}

/// POST /orders
#[tracing::instrument(skip(state, req), fields(lines = req.lines.len()))]
pub async fn place<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlacedOrderResponse>), ApiError> {
    if req.lines.is_empty() {
        return Err(ApiError::BadRequest("an order needs at least one line".into()));
    }
    let placed = state.reservations.place_order(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(PlacedOrderResponse {
            order: placed.order,
            saga_id: placed.saga_id,
        }),
    ))
}

/// GET /orders/{id}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(state.reservations.orders().get_order(order_id).await?))
}

/// POST /orders/{id}/lines
///
/// Name and price come from the catalog; the added quantity is reserved.
pub async fn add_line<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RequestedLine>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let order = state
        .reservations
        .add_line(order_id, req.product_id, req.quantity)
        .await?;
    Ok(Json(order))
}

/// DELETE /orders/{id}/lines/{product_id}
///
/// Releases the line's hold along with removing it.
pub async fn remove_line<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, product_id)): Path<(String, i64)>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let order = state
        .reservations
        .remove_line(order_id, ProductId::new(product_id))
        .await?;
    Ok(Json(order))
}

/// PUT /orders/{id}/addresses
pub async fn update_addresses<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AddressesRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let order = state
        .reservations
        .orders()
        .update_addresses(order_id, req.shipping_address, req.billing_address)
        .await?;
    Ok(Json(order))
}

/// PUT /orders/{id}/status
///
/// Moving to `Cancelled` also releases every hold placed for the order.
#[tracing::instrument(skip(state, req), fields(status = %req.status))]
pub async fn update_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<StatusChangeResponse>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;

    if req.status == OrderStatus::Cancelled {
        let cancelled = state
            .reservations
            .cancel_order(order_id, &CancellationToken::new())
            .await?;
        return Ok(Json(StatusChangeResponse {
            order: cancelled.order,
            saga_id: Some(cancelled.saga_id),
            released: Some(cancelled.released),
        }));
    }

    let order = state
        .reservations
        .orders()
        .update_status(order_id, req.status)
        .await?;
    Ok(Json(StatusChangeResponse {
        order,
        saga_id: None,
        released: None,
    }))
}

/// GET /orders/{id}/events
pub async fn events<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventEnvelopeResponse>>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    state.reservations.orders().get_order(order_id).await?;

    let envelopes = state
        .store
        .get_events_for_aggregate(order_id)
        .await
        .map_err(domain::DomainError::from)?;

    Ok(Json(
        envelopes
            .into_iter()
            .map(|e| EventEnvelopeResponse {
                event_id: e.event_id.to_string(),
                event_type: e.event_type,
                aggregate_id: e.aggregate_id.to_string(),
                version: e.version.as_i64(),
                timestamp: e.timestamp.to_rfc3339(),
                payload: e.payload,
            })
            .collect(),
    ))
}

/// GET /sagas/{id}
pub async fn saga<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ReservationSagaInstance>, ApiError> {
    let saga_id = parse_aggregate_id(&id)?;
    let saga = state
        .reservations
        .get_saga(saga_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("saga {id} not found")))?;
    Ok(Json(saga))
}
