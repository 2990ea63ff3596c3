//! Admin handlers: worker registration and queue management.
//!
//! Every route runs behind
//! [`require_admin_auth`](crate::web::middleware::require_admin_auth).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::hash_token;
use crate::queue::{QueueStats, Task, WorkerRecord};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WorkerCreate {
    pub name: String,
}

/// Registration response. The cleartext credential appears here exactly
/// once; only its hash is persisted.
#[derive(Debug, Serialize)]
pub struct WorkerRegistration {
    #[serde(flatten)]
    pub worker: WorkerRecord,
    pub worker_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskListing {
    pub items: Vec<Task>,
    pub total: usize,
}

/// `POST /workers` — register a worker and mint its credential.
pub async fn register_worker(
    State(state): State<AppState>,
    Json(request): Json<WorkerCreate>,
) -> ApiResult<(StatusCode, Json<WorkerRegistration>)> {
    let worker_id = Uuid::new_v4();
    let worker_token = state.tokens.issue_worker_token(worker_id)?;

    let worker = WorkerRecord::new(worker_id, request.name, hash_token(&worker_token));
    state.store.put_worker(&worker).await?;

    info!(worker_id = %worker_id, name = %worker.name, "Worker registered");
    Ok((
        StatusCode::CREATED,
        Json(WorkerRegistration {
            worker,
            worker_token,
        }),
    ))
}

/// `GET /workers` — list registered workers.
pub async fn list_workers(State(state): State<AppState>) -> ApiResult<Json<Vec<WorkerRecord>>> {
    Ok(Json(state.store.list_workers().await?))
}

/// `DELETE /workers/{id}` — revoke a worker.
pub async fn revoke_worker(
    State(state): State<AppState>,
    Path(worker_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_worker(worker_id).await? {
        return Err(ApiError::worker_not_found());
    }
    info!(worker_id = %worker_id, "Worker revoked");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /tasks` — bounded task listing for the dashboard.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<TaskListing>> {
    let items = state
        .engine
        .list_tasks(query.limit.unwrap_or(20), query.status.as_deref())
        .await?;
    let total = items.len();
    Ok(Json(TaskListing { items, total }))
}

/// `GET /queue/stats` — queue depth snapshot.
pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<Json<QueueStats>> {
    Ok(Json(state.engine.stats().await?))
}

/// `POST /tasks/retry-all-failed` — bulk requeue.
pub async fn retry_all_failed(
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let requeued = state.engine.requeue_all_failed().await?;
    info!(requeued, "Requeued all failed tasks");
    Ok(Json(serde_json::json!({
        "requeued": requeued,
        "message": format!("Successfully requeued {requeued} tasks"),
    })))
}

/// `POST /tasks/{id}/retry` — requeue one failed task.
pub async fn retry_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.engine.is_failed(task_id).await? {
        return Err(ApiError::NotFound(
            "Task not found in failed queue".to_string(),
        ));
    }

    state.engine.requeue(task_id).await?;
    info!(task_id = %task_id, "Task requeued");
    Ok(Json(serde_json::json!({
        "message": "Task requeued successfully",
        "task_id": task_id,
    })))
}
