//! Worker gateway handlers.
//!
//! The only interface worker processes have to the queue. Every route runs
//! behind [`require_worker_auth`](crate::web::middleware::require_worker_auth),
//! so handlers can trust the `WorkerIdentity` extension.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::queue::TaskStatus;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::middleware::WorkerIdentity;
use crate::web::state::AppState;

/// Task handed out to a polling worker.
#[derive(Debug, Serialize)]
pub struct LeasedTask {
    pub task_id: Uuid,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub eta: i64,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    /// Must be one of the lifecycle states; anything else is rejected at
    /// deserialization, before the record is touched.
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize)]
pub struct CompleteTaskRequest {
    pub result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct FailTaskRequest {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub message: &'static str,
    pub task_id: Uuid,
}

/// `GET /tasks/next` — poll for work.
///
/// 204 when the queue is empty (not an error); 404 when the popped id has no
/// record, which indicates inconsistent state rather than a crash-worthy
/// condition.
pub async fn next_task(
    State(state): State<AppState>,
    Extension(worker): Extension<WorkerIdentity>,
) -> ApiResult<Response> {
    let Some(task_id) = state.engine.lease().await? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let task = state
        .store
        .get_task(task_id)
        .await?
        .ok_or_else(ApiError::task_not_found)?;

    state
        .engine
        .start_processing(task_id, worker.worker_id)
        .await?;

    info!(task_id = %task_id, worker_id = %worker.worker_id, "Task handed to worker");
    Ok(Json(LeasedTask {
        task_id,
        payload: task.payload,
        created_at: task.created_at,
        eta: task.eta,
    })
    .into_response())
}

/// `PATCH /tasks/{id}/status` — fine-grained progress reporting.
///
/// Writes the status field directly, bypassing the lifecycle transitions.
/// An unknown status string fails the `TaskStatus` deserialization and the
/// request is rejected as unprocessable before the record is touched.
pub async fn update_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<StatusUpdateRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.store.task_exists(task_id).await? {
        return Err(ApiError::task_not_found());
    }

    state.store.set_task_status(task_id, request.status).await?;

    Ok(Json(serde_json::json!({
        "message": "Status updated",
        "task_id": task_id,
        "status": request.status,
    })))
}

/// `POST /tasks/{id}/complete` — submit a successful result.
pub async fn complete_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<CompleteTaskRequest>,
) -> ApiResult<Json<AckResponse>> {
    if !state.store.task_exists(task_id).await? {
        return Err(ApiError::task_not_found());
    }

    state.engine.complete_task(task_id, &request.result).await?;
    Ok(Json(AckResponse {
        message: "Task completed",
        task_id,
    }))
}

/// `POST /tasks/{id}/fail` — report a permanent failure.
pub async fn fail_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<FailTaskRequest>,
) -> ApiResult<Json<AckResponse>> {
    if !state.store.task_exists(task_id).await? {
        return Err(ApiError::task_not_found());
    }

    state.engine.fail_task(task_id, &request.error).await?;
    Ok(Json(AckResponse {
        message: "Task marked as failed",
        task_id,
    }))
}

/// `POST /heartbeat` — mark the worker as alive.
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(worker): Extension<WorkerIdentity>,
) -> ApiResult<Json<serde_json::Value>> {
    state.store.touch_worker(worker.worker_id).await?;
    Ok(Json(serde_json::json!({
        "message": "Heartbeat received",
        "worker_id": worker.worker_id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Task;
    use std::collections::HashMap;

    #[test]
    fn test_status_update_rejects_unknown_vocabulary() {
        // An out-of-vocabulary progress string must fail at the request
        // boundary, never reach the stored record.
        let parsed = serde_json::from_str::<StatusUpdateRequest>(r#"{"status":"ANALYZING_AUDIO"}"#);
        assert!(parsed.is_err());

        let parsed = serde_json::from_str::<StatusUpdateRequest>(r#"{"status":"pending"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_status_update_accepts_lifecycle_vocabulary() {
        let parsed: StatusUpdateRequest =
            serde_json::from_str(r#"{"status":"RETRY"}"#).expect("parse");
        assert_eq!(parsed.status, TaskStatus::Retry);
    }

    #[test]
    fn test_accepted_status_never_poisons_record() {
        // Any status that gets past the request type must decode back out
        // of the stored hash.
        let task = Task::new(Uuid::new_v4(), serde_json::json!({}), None, 5);
        for raw in ["PENDING", "STARTED", "SUCCESS", "FAILURE", "RETRY"] {
            let request: StatusUpdateRequest =
                serde_json::from_str(&format!(r#"{{"status":"{raw}"}}"#)).expect("parse");

            let mut fields: HashMap<String, String> = task
                .to_hash_fields()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            fields.insert("status".to_string(), request.status.as_str().to_string());

            let restored = Task::from_hash(&fields).expect("decode");
            assert_eq!(restored.status, request.status);
        }
    }
}
