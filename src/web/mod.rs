//! HTTP API: worker gateway, producer endpoints, and admin surface.
//!
//! # Routes
//!
//! ```text
//! GET    /health
//!
//! POST   /api/v1/client/tasks                     submit (Turnstile-gated)
//! GET    /api/v1/client/tasks/{id}                poll status
//!
//! GET    /api/v1/worker/tasks/next                poll for work   (worker token)
//! PATCH  /api/v1/worker/tasks/{id}/status         progress update (worker token)
//! POST   /api/v1/worker/tasks/{id}/complete       submit result   (worker token)
//! POST   /api/v1/worker/tasks/{id}/fail           report failure  (worker token)
//! POST   /api/v1/worker/heartbeat                 liveness        (worker token)
//!
//! POST   /api/v1/admin/workers                    register worker (admin token)
//! GET    /api/v1/admin/workers                    list workers    (admin token)
//! DELETE /api/v1/admin/workers/{id}               revoke worker   (admin token)
//! GET    /api/v1/admin/tasks                      list tasks      (admin token)
//! GET    /api/v1/admin/queue/stats                queue depths    (admin token)
//! POST   /api/v1/admin/tasks/retry-all-failed     bulk requeue    (admin token)
//! POST   /api/v1/admin/tasks/{id}/retry           requeue one     (admin token)
//! ```

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tracing::info;

pub use errors::{ApiError, ApiResult};
pub use state::AppState;

/// Builds the full application router.
pub fn build_router(state: AppState) -> Router {
    let worker_routes = Router::new()
        .route("/tasks/next", get(handlers::worker::next_task))
        .route("/tasks/:task_id/status", patch(handlers::worker::update_status))
        .route(
            "/tasks/:task_id/complete",
            post(handlers::worker::complete_task),
        )
        .route("/tasks/:task_id/fail", post(handlers::worker::fail_task))
        .route("/heartbeat", post(handlers::worker::heartbeat))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_worker_auth,
        ));

    let client_routes = Router::new()
        .route("/tasks", post(handlers::client::submit_task))
        .route("/tasks/:task_id", get(handlers::client::get_task_status));

    let admin_routes = Router::new()
        .route(
            "/workers",
            post(handlers::admin::register_worker).get(handlers::admin::list_workers),
        )
        .route("/workers/:worker_id", delete(handlers::admin::revoke_worker))
        .route("/tasks", get(handlers::admin::list_tasks))
        .route("/queue/stats", get(handlers::admin::queue_stats))
        .route(
            "/tasks/retry-all-failed",
            post(handlers::admin::retry_all_failed),
        )
        .route("/tasks/:task_id/retry", post(handlers::admin::retry_task))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/v1/worker", worker_routes)
        .nest("/api/v1/client", client_routes)
        .nest("/api/v1/admin", admin_routes)
        .with_state(state)
}

/// Binds and serves the API until the process exits.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let bind_addr = state.settings.bind_addr.clone();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
