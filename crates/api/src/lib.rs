//! HTTP surface for the stock ledger, customer orders and purchase orders.
//!
//! Handlers translate JSON to service calls and map every failure through
//! [`error::ApiError`]. Metrics are served in Prometheus text format.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::ApiError;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let inventory = Router::new()
        .route("/inventory", post(routes::inventory::create::<S>))
        .route("/inventory/{id}", get(routes::inventory::get::<S>))
        .route(
            "/inventory/{id}/transactions",
            get(routes::inventory::transactions::<S>).post(routes::inventory::record::<S>),
        )
        .route("/products/{product_id}/stock", get(routes::inventory::by_product::<S>))
        .route("/locations/{location_id}/stock", get(routes::inventory::by_location::<S>));

    let orders = Router::new()
        .route("/orders", post(routes::orders::place::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/lines", post(routes::orders::add_line::<S>))
        .route("/orders/{id}/lines/{product_id}", delete(routes::orders::remove_line::<S>))
        .route("/orders/{id}/addresses", put(routes::orders::update_addresses::<S>))
        .route("/orders/{id}/status", put(routes::orders::update_status::<S>))
        .route("/orders/{id}/events", get(routes::orders::events::<S>))
        .route("/sagas/{id}", get(routes::orders::saga::<S>));

    let purchase_orders = Router::new()
        .route("/purchase-orders", post(routes::purchase_orders::create::<S>))
        .route(
            "/purchase-orders/by-number/{number}",
            get(routes::purchase_orders::by_number::<S>),
        )
        .route(
            "/purchase-orders/{id}",
            get(routes::purchase_orders::get::<S>).put(routes::purchase_orders::update_details::<S>),
        )
        .route("/purchase-orders/{id}/lines", post(routes::purchase_orders::add_line::<S>))
        .route(
            "/purchase-orders/{id}/lines/{line_id}",
            put(routes::purchase_orders::update_line::<S>).delete(routes::purchase_orders::remove_line::<S>),
        )
        .route("/purchase-orders/{id}/status", put(routes::purchase_orders::update_status::<S>))
        .route(
            "/purchase-orders/{id}/lines/{line_id}/receipts",
            post(routes::purchase_orders::receive::<S>),
        );

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/catalog/products/{product_id}",
            get(routes::catalog::get::<S>).put(routes::catalog::upsert::<S>),
        )
        .merge(inventory)
        .merge(orders)
        .merge(purchase_orders)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
