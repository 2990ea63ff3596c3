//! Producer-facing task submission and status polling.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::queue::{Task, TaskStatus};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TaskSubmission {
    /// Opaque job arguments handed through to the worker.
    pub payload: serde_json::Value,
    #[serde(default)]
    pub email_notify: Option<String>,
    /// Cloudflare Turnstile token from the frontend.
    pub turnstile_token: String,
}

/// Task record augmented with submission-time placement.
#[derive(Debug, Serialize)]
pub struct SubmittedTask {
    #[serde(flatten)]
    pub task: Task,
    pub queue_position: u64,
    pub estimated_time_seconds: i64,
}

/// `POST /tasks` — submit a new task.
///
/// Bot verification runs first; a rejected token aborts before any queue
/// mutation.
pub async fn submit_task(
    State(state): State<AppState>,
    Json(submission): Json<TaskSubmission>,
) -> ApiResult<(StatusCode, Json<SubmittedTask>)> {
    state.captcha.verify(&submission.turnstile_token).await?;

    if !submission.payload.is_object() {
        return Err(ApiError::BadRequest(
            "Task payload must be a JSON object".to_string(),
        ));
    }

    let placement = state.engine.submission_placement().await?;
    let task = Task::new(
        Uuid::new_v4(),
        submission.payload,
        submission.email_notify,
        placement.estimated_time_seconds,
    );
    state.engine.enqueue(&task).await?;

    info!(
        task_id = %task.task_id,
        queue_position = placement.queue_position,
        "Task submitted"
    );
    Ok((
        StatusCode::CREATED,
        Json(SubmittedTask {
            task,
            queue_position: placement.queue_position,
            estimated_time_seconds: placement.estimated_time_seconds,
        }),
    ))
}

/// `GET /tasks/{id}` — poll task status.
///
/// For a still-pending task the ETA is recomputed from the live queue, so
/// the value may shrink or grow between polls.
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let mut task = state
        .store
        .get_task(task_id)
        .await?
        .ok_or_else(ApiError::task_not_found)?;

    if task.status == TaskStatus::Pending {
        if let Some(eta) = state.engine.pending_eta(task_id).await? {
            task.eta = eta;
        }
    }

    Ok(Json(task))
}
