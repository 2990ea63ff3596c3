//! Task and worker record types.
//!
//! This module defines the core records stored in Redis:
//!
//! - `Task`: a unit of voice-analysis work with its full lifecycle state
//! - `TaskStatus`: the closed set of lifecycle states
//! - `WorkerRecord`: a registered external worker process
//!
//! Records are persisted as Redis hashes, so every type here knows how to
//! convert itself to and from string field mappings.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Sentinel stored in the hash when no notification address was supplied.
const EMAIL_NONE: &str = "none";

/// Errors that can occur when decoding a record from its Redis hash.
#[derive(Debug, Error)]
pub enum TaskDataError {
    #[error("Missing required field '{0}' in task record")]
    MissingField(&'static str),

    #[error("Invalid task status '{0}'")]
    InvalidStatus(String),

    #[error("Invalid timestamp in field '{field}': {message}")]
    InvalidTimestamp { field: &'static str, message: String },

    #[error("Invalid task id '{0}'")]
    InvalidTaskId(String),

    #[error("Invalid payload JSON: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Lifecycle state of a task.
///
/// Mirrors the Celery status vocabulary so existing workers and dashboards
/// keep working against the same strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting in the pending queue.
    Pending,
    /// Leased by a worker and being processed.
    Started,
    /// Completed successfully (terminal).
    Success,
    /// Failed permanently (terminal unless explicitly requeued).
    Failure,
    /// Reclaimed from a dead worker and waiting to run again.
    Retry,
}

impl TaskStatus {
    /// The string form persisted in Redis.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Started => "STARTED",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failure => "FAILURE",
            TaskStatus::Retry => "RETRY",
        }
    }

    /// Returns whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "STARTED" => Ok(TaskStatus::Started),
            "SUCCESS" => Ok(TaskStatus::Success),
            "FAILURE" => Ok(TaskStatus::Failure),
            "RETRY" => Ok(TaskStatus::Retry),
            other => Err(TaskDataError::InvalidStatus(other.to_string())),
        }
    }
}

/// A task record as stored at `task:{task_id}`.
///
/// The payload is opaque to the queue; workers interpret it. Timestamps are
/// set exactly once: `created_at` at enqueue, `started_at` at first lease,
/// `completed_at` on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub traceback: String,
    pub retries: u32,
    #[serde(default)]
    pub worker_id: String,
    /// Estimated wait in seconds, computed at submission time.
    pub eta: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_notify: Option<String>,
}

impl Task {
    /// Creates a fresh pending task record.
    pub fn new(
        task_id: Uuid,
        payload: serde_json::Value,
        email_notify: Option<String>,
        eta: i64,
    ) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            payload,
            result: None,
            traceback: String::new(),
            retries: 0,
            worker_id: String::new(),
            eta,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            email_notify,
        }
    }

    /// Converts the record into the field mapping written at enqueue time.
    ///
    /// Optional timestamps are omitted entirely rather than written empty,
    /// so their presence in the hash tracks the lifecycle invariants.
    pub fn to_hash_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("task_id", self.task_id.to_string()),
            ("status", self.status.as_str().to_string()),
            ("payload", self.payload.to_string()),
            ("traceback", self.traceback.clone()),
            ("retries", self.retries.to_string()),
            ("worker_id", self.worker_id.clone()),
            ("eta", self.eta.to_string()),
            ("created_at", self.created_at.to_rfc3339()),
            (
                "email_notify",
                self.email_notify
                    .clone()
                    .unwrap_or_else(|| EMAIL_NONE.to_string()),
            ),
        ];
        if let Some(result) = &self.result {
            fields.push(("result", result.to_string()));
        }
        if let Some(started_at) = self.started_at {
            fields.push(("started_at", started_at.to_rfc3339()));
        }
        if let Some(completed_at) = self.completed_at {
            fields.push(("completed_at", completed_at.to_rfc3339()));
        }
        fields
    }

    /// Reconstructs a record from a Redis hash mapping.
    pub fn from_hash(fields: &HashMap<String, String>) -> Result<Self, TaskDataError> {
        let task_id = fields
            .get("task_id")
            .ok_or(TaskDataError::MissingField("task_id"))?;
        let task_id =
            Uuid::parse_str(task_id).map_err(|_| TaskDataError::InvalidTaskId(task_id.clone()))?;

        let status: TaskStatus = fields
            .get("status")
            .ok_or(TaskDataError::MissingField("status"))?
            .parse()?;

        let payload = match fields.get("payload") {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
            _ => serde_json::Value::Object(Default::default()),
        };

        let result = match fields.get("result") {
            Some(raw) if !raw.is_empty() => Some(serde_json::from_str(raw)?),
            _ => None,
        };

        let email_notify = fields
            .get("email_notify")
            .filter(|v| !v.is_empty() && v.as_str() != EMAIL_NONE)
            .cloned();

        Ok(Self {
            task_id,
            status,
            payload,
            result,
            traceback: fields.get("traceback").cloned().unwrap_or_default(),
            retries: fields
                .get("retries")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            worker_id: fields.get("worker_id").cloned().unwrap_or_default(),
            eta: fields.get("eta").and_then(|v| v.parse().ok()).unwrap_or(0),
            created_at: parse_timestamp(fields, "created_at")?
                .ok_or(TaskDataError::MissingField("created_at"))?,
            started_at: parse_timestamp(fields, "started_at")?,
            completed_at: parse_timestamp(fields, "completed_at")?,
            email_notify,
        })
    }
}

fn parse_timestamp(
    fields: &HashMap<String, String>,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, TaskDataError> {
    match fields.get(field) {
        Some(raw) if !raw.is_empty() => DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| TaskDataError::InvalidTimestamp {
                field,
                message: e.to_string(),
            }),
        _ => Ok(None),
    }
}

/// A registered worker as stored at `worker:{worker_id}`.
///
/// The credential itself is never stored; only its SHA-256 hash is kept for
/// audit. Deleting this record is what revokes the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: Uuid,
    pub name: String,
    pub token_hash: String,
    pub registered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

impl WorkerRecord {
    /// Creates a registration record for a freshly minted worker.
    pub fn new(worker_id: Uuid, name: impl Into<String>, token_hash: impl Into<String>) -> Self {
        Self {
            worker_id,
            name: name.into(),
            token_hash: token_hash.into(),
            registered_at: Utc::now(),
            last_active: None,
        }
    }

    /// Converts the record into its Redis hash mapping.
    pub fn to_hash_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("worker_id", self.worker_id.to_string()),
            ("name", self.name.clone()),
            ("token_hash", self.token_hash.clone()),
            ("registered_at", self.registered_at.to_rfc3339()),
            (
                "last_active",
                self.last_active.map(|t| t.to_rfc3339()).unwrap_or_default(),
            ),
        ]
    }

    /// Reconstructs a record from a Redis hash mapping.
    pub fn from_hash(fields: &HashMap<String, String>) -> Result<Self, TaskDataError> {
        let worker_id = fields
            .get("worker_id")
            .ok_or(TaskDataError::MissingField("worker_id"))?;
        let worker_id = Uuid::parse_str(worker_id)
            .map_err(|_| TaskDataError::InvalidTaskId(worker_id.clone()))?;

        Ok(Self {
            worker_id,
            name: fields.get("name").cloned().unwrap_or_default(),
            token_hash: fields.get("token_hash").cloned().unwrap_or_default(),
            registered_at: parse_timestamp(fields, "registered_at")?
                .ok_or(TaskDataError::MissingField("registered_at"))?,
            last_active: parse_timestamp(fields, "last_active")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields_map(task: &Task) -> HashMap<String, String> {
        task.to_hash_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Started,
            TaskStatus::Success,
            TaskStatus::Failure,
            TaskStatus::Retry,
        ] {
            let parsed: TaskStatus = status.as_str().parse().expect("valid status");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_status_rejects_unknown() {
        assert!("pending".parse::<TaskStatus>().is_err());
        assert!("DONE".parse::<TaskStatus>().is_err());
        assert!("".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_terminal() {
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failure.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Started.is_terminal());
        assert!(!TaskStatus::Retry.is_terminal());
    }

    #[test]
    fn test_status_serializes_screaming() {
        let json = serde_json::to_string(&TaskStatus::Failure).expect("serialize");
        assert_eq!(json, "\"FAILURE\"");
    }

    #[test]
    fn test_new_task_defaults() {
        let id = Uuid::new_v4();
        let task = Task::new(id, json!({"voice_url": "https://x/y.mp3"}), None, 5);

        assert_eq!(task.task_id, id);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retries, 0);
        assert!(task.worker_id.is_empty());
        assert!(task.result.is_none());
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_task_hash_roundtrip() {
        let task = Task::new(
            Uuid::new_v4(),
            json!({"voice_url": "https://x/y.mp3"}),
            Some("ops@example.com".to_string()),
            15,
        );

        let restored = Task::from_hash(&fields_map(&task)).expect("decode");
        assert_eq!(restored.task_id, task.task_id);
        assert_eq!(restored.status, TaskStatus::Pending);
        assert_eq!(restored.payload, task.payload);
        assert_eq!(restored.eta, 15);
        assert_eq!(restored.email_notify, Some("ops@example.com".to_string()));
        assert!(restored.started_at.is_none());
    }

    #[test]
    fn test_task_hash_roundtrip_completed() {
        let mut task = Task::new(Uuid::new_v4(), json!({}), None, 5);
        task.status = TaskStatus::Success;
        task.worker_id = "worker-1".to_string();
        task.result = Some(json!({"scam_score": 0.8}));
        task.started_at = Some(Utc::now());
        task.completed_at = Some(Utc::now());

        let restored = Task::from_hash(&fields_map(&task)).expect("decode");
        assert_eq!(restored.status, TaskStatus::Success);
        assert_eq!(restored.result, Some(json!({"scam_score": 0.8})));
        assert!(restored.started_at.is_some());
        assert!(restored.completed_at.is_some());
    }

    #[test]
    fn test_email_none_sentinel() {
        let task = Task::new(Uuid::new_v4(), json!({}), None, 5);
        let fields = fields_map(&task);
        assert_eq!(fields.get("email_notify").map(String::as_str), Some("none"));

        let restored = Task::from_hash(&fields).expect("decode");
        assert!(restored.email_notify.is_none());
    }

    #[test]
    fn test_from_hash_missing_fields() {
        let empty = HashMap::new();
        assert!(matches!(
            Task::from_hash(&empty),
            Err(TaskDataError::MissingField("task_id"))
        ));
    }

    #[test]
    fn test_from_hash_bad_status() {
        let mut fields = fields_map(&Task::new(Uuid::new_v4(), json!({}), None, 5));
        fields.insert("status".to_string(), "EXPLODED".to_string());
        assert!(matches!(
            Task::from_hash(&fields),
            Err(TaskDataError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_worker_record_roundtrip() {
        let record = WorkerRecord::new(Uuid::new_v4(), "gpu-box-1", "abc123");
        let fields: HashMap<String, String> = record
            .to_hash_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        let restored = WorkerRecord::from_hash(&fields).expect("decode");
        assert_eq!(restored.worker_id, record.worker_id);
        assert_eq!(restored.name, "gpu-box-1");
        assert_eq!(restored.token_hash, "abc123");
        assert!(restored.last_active.is_none());
    }
}
