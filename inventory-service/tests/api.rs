mod support;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use inventory_service::api::{create_router, AppState};
use inventory_service::MemoryStore;
use serde_json::{json, Value};
use shared::PlacementPolicy;
use support::*;
use tower::ServiceExt;

fn app(store: &MemoryStore) -> Router {
    create_router(AppState::new(service(store)))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn order(product_id: i32, quantity: i32, user_id: &str) -> Option<Value> {
    Some(json!({ "productId": product_id, "quantity": quantity, "userId": user_id }))
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app(&MemoryStore::seeded());
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn placed_order_can_be_looked_up() {
    let store = MemoryStore::seeded();
    let app = app(&store);

    let (status, receipt) = send(&app, Method::POST, "/api/orders/pessimistic", order(1, 3, "alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["status"], "SUCCESS");

    let order_id = receipt["orderId"].as_str().unwrap();
    let (status, stored) = send(&app, Method::GET, &format!("/api/orders/{order_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["userId"], "alice");
    assert_eq!(stored["quantity"], 3);
    assert_eq!(stored["status"], "SUCCESS");

    let (status, product) = send(&app, Method::GET, "/api/products/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["stock"], 97);
    assert_eq!(product["version"], 2);
}

#[tokio::test]
async fn failures_map_to_distinct_statuses() {
    let store = MemoryStore::seeded();
    let app = app(&store);

    let (status, body) = send(&app, Method::POST, "/api/orders/optimistic", order(2, 51, "bob")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("insufficient stock"));

    let (status, _) = send(&app, Method::POST, "/api/orders/pessimistic", order(9, 1, "bob")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/api/orders/optimistic", order(1, 0, "bob")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, Method::GET, "/api/products/9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let missing = uuid::Uuid::new_v4();
    let (status, _) = send(&app, Method::GET, &format!("/api/orders/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn exhausted_optimistic_conflict_is_409() {
    let store = MemoryStore::seeded();
    store.interleave_writer(|item| item.version += 1);
    let app = app(&store);

    let (status, body) = send(&app, Method::POST, "/api/orders/optimistic", order(1, 1, "carol")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn stats_partition_every_recorded_attempt() {
    let store = MemoryStore::seeded();
    store.interleave_writer(|item| item.version += 1);
    let app = create_router(AppState::new(service_with(&store, PlacementPolicy::new(2000, 1, 0))));

    send(&app, Method::POST, "/api/orders/pessimistic", order(1, 10, "a")).await;
    send(&app, Method::POST, "/api/orders/pessimistic", order(2, 80, "b")).await;
    send(&app, Method::POST, "/api/orders/optimistic", order(1, 1, "c")).await;
    send(&app, Method::POST, "/api/orders/pessimistic", order(3, 1, "not-ledgered")).await;

    let (status, stats) = send(&app, Method::GET, "/api/orders/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        stats,
        json!({
            "totalOrders": 3,
            "successfulOrders": 1,
            "failedOutOfStock": 1,
            "failedConflict": 1,
        })
    );
}

#[tokio::test]
async fn reset_restores_seed_stock_and_versions() {
    let store = MemoryStore::seeded();
    let app = app(&store);

    send(&app, Method::POST, "/api/orders/optimistic", order(1, 40, "a")).await;
    send(&app, Method::POST, "/api/orders/pessimistic", order(2, 50, "b")).await;

    let (status, body) = send(&app, Method::POST, "/api/products/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Product inventory reset successfully.");

    for (id, stock) in [(1, 100), (2, 50)] {
        let (_, product) = send(&app, Method::GET, &format!("/api/products/{id}"), None).await;
        assert_eq!(product["stock"], stock);
        assert_eq!(product["version"], 1);
    }
    assert_eq!(store.orders().len(), 2, "reset never touches the ledger");
}
