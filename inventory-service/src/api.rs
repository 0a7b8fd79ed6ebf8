use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use shared::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;
use crate::error::PlacementError;
use crate::placement::InventoryService;
use crate::store::InventoryStore;

pub struct AppState<S> {
    pub service: Arc<InventoryService<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: InventoryStore> AppState<S> {
    pub fn new(service: InventoryService<S>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn create_router<S: InventoryStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/products/reset", post(reset_products::<S>))
        .route("/api/products/:product_id", get(get_product::<S>))
        .route("/api/orders/pessimistic", post(place_pessimistic::<S>))
        .route("/api/orders/optimistic", post(place_optimistic::<S>))
        .route("/api/orders/stats", get(order_stats::<S>))
        .route("/api/orders/:order_id", get(get_order::<S>))
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

/// HTTP status for each placement outcome. Every business failure keeps its
/// own code so callers can tell them apart.
pub fn status_for(err: &PlacementError) -> StatusCode {
    match err {
        PlacementError::NotFound { .. } => StatusCode::NOT_FOUND,
        PlacementError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
        PlacementError::LockTimeout | PlacementError::ConflictExhausted { .. } => StatusCode::CONFLICT,
        PlacementError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PlacementError::Database(_) | PlacementError::Pool(_) | PlacementError::CorruptLedger(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: PlacementError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    (status, Json(ErrorResponse { error: err.to_string() }))
}

fn not_found(what: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("{} not found", what),
        }),
    )
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status_code = response.status().as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        "http_request"
    );
    response
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn reset_products<S: InventoryStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.service.reset().await.map_err(error_response)?;
    Ok(Json(MessageResponse {
        message: "Product inventory reset successfully.".to_string(),
    }))
}

pub async fn get_product<S: InventoryStore>(
    State(state): State<AppState<S>>,
    Path(product_id): Path<i32>,
) -> Result<Json<InventoryItem>, ApiError> {
    match state.service.product(product_id).await.map_err(error_response)? {
        Some(item) => Ok(Json(item)),
        None => Err(not_found("Product")),
    }
}

pub async fn place_pessimistic<S: InventoryStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<OrderRequest>,
) -> Result<Json<PlacementReceipt>, ApiError> {
    place(state, Strategy::Pessimistic, request).await
}

pub async fn place_optimistic<S: InventoryStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<OrderRequest>,
) -> Result<Json<PlacementReceipt>, ApiError> {
    place(state, Strategy::Optimistic, request).await
}

async fn place<S: InventoryStore>(
    state: AppState<S>,
    strategy: Strategy,
    request: OrderRequest,
) -> Result<Json<PlacementReceipt>, ApiError> {
    state
        .service
        .place(strategy, &request)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn order_stats<S: InventoryStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<OrderStats>, ApiError> {
    state.service.recorded_stats().await.map(Json).map_err(error_response)
}

pub async fn get_order<S: InventoryStore>(
    State(state): State<AppState<S>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, ApiError> {
    match state.service.order(order_id).await.map_err(error_response)? {
        Some(order) => Ok(Json(order)),
        None => Err(not_found("Order")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::result::Error as DieselError;

    #[test]
    fn business_failures_map_to_distinct_client_codes() {
        let id = Uuid::new_v4();
        let cases = [
            (PlacementError::NotFound { product_id: 1 }, StatusCode::NOT_FOUND),
            (
                PlacementError::InsufficientStock { order_id: id, product_id: 1, requested: 5, available: 2 },
                StatusCode::BAD_REQUEST,
            ),
            (PlacementError::LockTimeout, StatusCode::CONFLICT),
            (PlacementError::ConflictExhausted { order_id: id, attempts: 3 }, StatusCode::CONFLICT),
            (PlacementError::InvalidRequest("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (PlacementError::Database(DieselError::RollbackTransaction), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(status_for(&err), expected, "{err}");
        }
    }
}
