//! Liveness endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::web::state::AppState;

/// `GET /health` — service liveness plus a backend ping. Unauthenticated.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "redis": "up" })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "degraded", "redis": "down" })),
        ),
    }
}
