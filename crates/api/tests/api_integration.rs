//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::{AppState, Config};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::ProductId;
use domain::Money;
use event_store::InMemoryEventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::InMemoryProductCatalog;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (Router, Arc<AppState<InMemoryEventStore>>) {
    let catalog = InMemoryProductCatalog::new()
        .with_product(ProductId::new(1), "Widget", Money::from_cents(1000))
        .with_product(ProductId::new(2), "Gadget", Money::from_cents(2500));
    let state = Arc::new(AppState::new(
        InMemoryEventStore::new(),
        catalog,
        &Config::default(),
    ));
    (api::create_app(Arc::clone(&state), metrics_handle()), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn stock(app: &Router, product_id: i64, location_id: i64, quantity: i64) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/inventory",
        Some(json!({ "product_id": product_id, "location_id": location_id, "quantity": quantity })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

fn address() -> Value {
    json!({ "street": "4 Mill Lane", "city": "Bristol", "postal_code": "BS1 4AA", "country": "UK" })
}

fn order_request(lines: Value) -> Value {
    json!({
        "customer_ref": "customer-7",
        "shipping_address": address(),
        "billing_address": address(),
        "lines": lines,
    })
}

#[tokio::test]
async fn health_check() {
    let (app, _) = setup();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

mod ledger {
    use super::*;

    #[tokio::test]
    async fn stock_in_out_and_history() {
        let (app, _) = setup();
        let id = stock(&app, 1, 1, 10).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/inventory/{id}/transactions"),
            Some(json!({ "type": "StockOut", "quantity": 4, "reference": "pick-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quantity"], 6);

        let (_, history) = send(&app, "GET", &format!("/inventory/{id}/transactions"), None).await;
        let history = history.as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1]["type"], "StockOut");
        assert_eq!(history[1]["quantity"], -4);
    }

    #[tokio::test]
    async fn overdrawn_stock_out_is_unprocessable() {
        let (app, _) = setup();
        let id = stock(&app, 1, 1, 3).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/inventory/{id}/transactions"),
            Some(json!({ "type": "StockOut", "quantity": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "InsufficientStock");

        let (_, record) = send(&app, "GET", &format!("/inventory/{id}"), None).await;
        assert_eq!(record["quantity"], 3);
    }

    #[tokio::test]
    async fn transfer_is_unsupported() {
        let (app, _) = setup();
        let id = stock(&app, 1, 1, 3).await;
        let (status, _) = send(
            &app,
            "POST",
            &format!("/inventory/{id}/transactions"),
            Some(json!({ "type": "Transfer", "quantity": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn duplicate_record_conflicts() {
        let (app, _) = setup();
        stock(&app, 1, 1, 3).await;
        let (status, _) = send(
            &app,
            "POST",
            "/inventory",
            Some(json!({ "product_id": 1, "location_id": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn malformed_and_unknown_ids() {
        let (app, _) = setup();
        let (status, _) = send(&app, "GET", "/inventory/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "GET",
            &format!("/inventory/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn product_totals_span_locations() {
        let (app, _) = setup();
        stock(&app, 2, 1, 4).await;
        stock(&app, 2, 2, 6).await;

        let (status, body) = send(&app, "GET", "/products/2/stock", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 10);
        assert_eq!(body["available"], 10);
        assert_eq!(body["records"].as_array().unwrap().len(), 2);

        let (_, at_two) = send(&app, "GET", "/locations/2/stock", None).await;
        assert_eq!(at_two.as_array().unwrap().len(), 1);
    }
}

mod orders {
    use super::*;

    #[tokio::test]
    async fn placement_reserves_and_cancellation_releases() {
        let (app, state) = setup();
        stock(&app, 1, 1, 10).await;

        let (status, placed) = send(
            &app,
            "POST",
            "/orders",
            Some(order_request(json!([{ "product_id": 1, "quantity": 3 }]))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{placed}");
        assert_eq!(placed["order"]["status"], "Pending");
        assert_eq!(placed["order"]["total_amount"], 3000);
        let order_id = placed["order"]["id"].as_str().unwrap().to_string();
        assert_eq!(state.inventory.available(ProductId::new(1)).await.unwrap(), 7);

        let (status, saga) = send(
            &app,
            "GET",
            &format!("/sagas/{}", placed["saga_id"].as_str().unwrap()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saga["state"], "Completed");

        let (status, cancelled) = send(
            &app,
            "PUT",
            &format!("/orders/{order_id}/status"),
            Some(json!({ "status": "Cancelled" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{cancelled}");
        assert_eq!(cancelled["order"]["status"], "Cancelled");
        assert_eq!(cancelled["released"], 1);
        assert_eq!(state.inventory.available(ProductId::new(1)).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn line_edits_follow_catalog_and_holds() {
        let (app, state) = setup();
        stock(&app, 1, 1, 10).await;
        stock(&app, 2, 1, 4).await;
        let (_, placed) = send(
            &app,
            "POST",
            "/orders",
            Some(order_request(json!([{ "product_id": 1, "quantity": 3 }]))),
        )
        .await;
        let order_id = placed["order"]["id"].as_str().unwrap().to_string();
        let lines = format!("/orders/{order_id}/lines");

        let (status, order) = send(
            &app,
            "POST",
            &lines,
            Some(json!({ "product_id": 1, "quantity": 2, "unit_price": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{order}");
        assert_eq!(order["total_amount"], 5000);
        assert_eq!(state.inventory.available(ProductId::new(1)).await.unwrap(), 5);

        let (status, body) = send(
            &app,
            "POST",
            &lines,
            Some(json!({ "product_id": 2, "quantity": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "InsufficientStock");
        assert_eq!(state.inventory.available(ProductId::new(2)).await.unwrap(), 4);

        let (status, order) = send(&app, "DELETE", &format!("{lines}/1"), None).await;
        assert_eq!(status, StatusCode::OK, "{order}");
        assert!(order["lines"].as_array().unwrap().is_empty());
        assert_eq!(state.inventory.available(ProductId::new(1)).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn insufficient_stock_is_unprocessable() {
        let (app, state) = setup();
        stock(&app, 1, 1, 2).await;

        let (status, body) = send(
            &app,
            "POST",
            "/orders",
            Some(order_request(json!([{ "product_id": 1, "quantity": 5 }]))),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "InsufficientStock");
        assert!(state.publisher.events_for(domain::topics::ORDER_CREATED).is_empty());
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let (app, _) = setup();
        let (status, _) = send(
            &app,
            "POST",
            "/orders",
            Some(order_request(json!([{ "product_id": 99, "quantity": 1 }]))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn illegal_transition_conflicts() {
        let (app, _) = setup();
        stock(&app, 2, 1, 5).await;
        let (_, placed) = send(
            &app,
            "POST",
            "/orders",
            Some(order_request(json!([{ "product_id": 2, "quantity": 1 }]))),
        )
        .await;
        let order_id = placed["order"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/orders/{order_id}/status"),
            Some(json!({ "status": "Shipped" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "InvalidTransition");

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/orders/{order_id}/status"),
            Some(json!({ "status": "Confirmed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["order"]["status"], "Confirmed");
        assert!(body.get("released").is_none());

        let (_, events) = send(&app, "GET", &format!("/orders/{order_id}/events"), None).await;
        let types: Vec<&str> = events
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["event_type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["OrderPlaced", "StatusChanged"]);
    }
}

mod purchase_orders {
    use super::*;

    async fn ordered_po(app: &Router) -> (String, String) {
        let (status, po) = send(
            app,
            "POST",
            "/purchase-orders",
            Some(json!({
                "order_number": "PO-100",
                "supplier_id": 5,
                "lines": [{ "product_id": 1, "quantity": 10, "unit_price": 250 }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{po}");
        assert_eq!(po["total_amount"], 2500);
        let id = po["id"].as_str().unwrap().to_string();
        let line_id = po["lines"][0]["line_id"].as_str().unwrap().to_string();

        for target in ["Submitted", "Approved", "Ordered"] {
            let (status, body) = send(
                app,
                "PUT",
                &format!("/purchase-orders/{id}/status"),
                Some(json!({ "status": target })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{body}");
        }
        (id, line_id)
    }

    #[tokio::test]
    async fn receipts_add_stock_and_derive_status() {
        let (app, state) = setup();
        let (id, line_id) = ordered_po(&app).await;
        let uri = format!("/purchase-orders/{id}/lines/{line_id}/receipts");

        let (status, body) = send(&app, "POST", &uri, Some(json!({ "quantity": 4 }))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["purchase_order"]["status"], "PartiallyReceived");
        assert_eq!(body["previous_status"], "Ordered");

        let (_, body) = send(&app, "POST", &uri, Some(json!({ "quantity": 6 }))).await;
        assert_eq!(body["purchase_order"]["status"], "Completed");
        assert_eq!(state.inventory.available(ProductId::new(1)).await.unwrap(), 10);

        let (status, _) = send(&app, "POST", &uri, Some(json!({ "quantity": 1 }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn derived_status_cannot_be_requested() {
        let (app, _) = setup();
        let (id, _) = ordered_po(&app).await;
        let (status, _) = send(
            &app,
            "PUT",
            &format!("/purchase-orders/{id}/status"),
            Some(json!({ "status": "Completed" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn duplicate_order_number_conflicts() {
        let (app, _) = setup();
        ordered_po(&app).await;
        let (status, _) = send(
            &app,
            "POST",
            "/purchase-orders",
            Some(json!({ "order_number": "PO-100", "supplier_id": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, po) = send(&app, "GET", "/purchase-orders/by-number/PO-100", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(po["status"], "Ordered");
    }

    #[tokio::test]
    async fn negative_receipt_is_bad_request() {
        let (app, _) = setup();
        let (id, line_id) = ordered_po(&app).await;
        let (status, _) = send(
            &app,
            "POST",
            &format!("/purchase-orders/{id}/lines/{line_id}/receipts"),
            Some(json!({ "quantity": -2 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn metrics_are_exported() {
    let (app, _) = setup();
    stock(&app, 1, 1, 1).await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("stock_transactions_total"));
}
