//! Redis-backed record store primitives.
//!
//! `TaskStore` owns the connection to Redis and exposes the low-level
//! record operations the queue engine and HTTP handlers are built on:
//! task hashes, the worker registry, and key naming.
//!
//! # Key layout
//!
//! - `task:{task_id}`: hash holding one task record
//! - `worker:{worker_id}`: hash holding one worker registration
//! - `queue:pending`: list of task ids waiting to run (FIFO)
//! - `queue:processing`: sorted set of leased ids, scored by lease start
//! - `queue:failed`: sorted set of failed ids, scored by failure time
//!
//! All mutability lives in Redis; no record is cached across operations.

use std::collections::HashMap;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::task::{Task, TaskDataError, TaskStatus, WorkerRecord};

/// Redis key of the pending FIFO list.
pub const PENDING_KEY: &str = "queue:pending";
/// Redis key of the processing sorted set (score = lease start, unix secs).
pub const PROCESSING_KEY: &str = "queue:processing";
/// Redis key of the failed sorted set (score = failure time, unix secs).
pub const FAILED_KEY: &str = "queue:failed";

/// Builds the record key for a task id.
pub fn task_key(task_id: Uuid) -> String {
    format!("task:{task_id}")
}

/// Builds the record key for a worker id.
pub fn worker_key(worker_id: Uuid) -> String {
    format!("worker:{worker_id}")
}

/// Errors that can occur during store and queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to connect to Redis after exhausting the retry budget.
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failed to serialize payload or result data.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record could not be decoded.
    #[error("Corrupt record: {0}")]
    CorruptRecord(#[from] TaskDataError),

    /// Task not found in the store.
    #[error("Task {0} not found")]
    TaskNotFound(Uuid),

    /// A task with this id already has a record.
    #[error("Task {0} already exists")]
    DuplicateTask(Uuid),

    /// Worker not found in the registry.
    #[error("Worker {0} not found")]
    WorkerNotFound(Uuid),
}

/// Connection settings for the initial Redis handshake.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum connection attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Low-level store for task and worker records.
///
/// Cloning is cheap: `ConnectionManager` is itself a cloneable handle over a
/// multiplexed connection and reconnects automatically after network blips.
#[derive(Clone)]
pub struct TaskStore {
    redis: ConnectionManager,
}

impl TaskStore {
    /// Connects to Redis, retrying with exponential backoff.
    ///
    /// Only the initial handshake is retried here; once established, the
    /// connection manager handles reconnection on its own.
    pub async fn connect(redis_url: &str, retry: RetryPolicy) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let mut delay = retry.base_delay;
        let mut last_error = String::new();
        for attempt in 1..=retry.max_attempts.max(1) {
            match ConnectionManager::new(client.clone()).await {
                Ok(redis) => {
                    info!(attempt, "Connected to Redis");
                    return Ok(Self { redis });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Redis connection attempt failed");
                    last_error = e.to_string();
                    if attempt < retry.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(QueueError::ConnectionFailed(last_error))
    }

    /// Creates a store from an existing connection manager.
    ///
    /// Useful when sharing one connection across components.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Returns a connection handle for ad-hoc commands and pipelines.
    pub(crate) fn connection(&self) -> ConnectionManager {
        self.redis.clone()
    }

    /// Pings the backend; used by the health endpoint.
    pub async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Task records
    // ------------------------------------------------------------------

    /// Fetches a task record, or `None` if the id has no record.
    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, QueueError> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn.hgetall(task_key(task_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(Task::from_hash(&fields)?))
    }

    /// Fetches a task record, erroring when absent.
    pub async fn require_task(&self, task_id: Uuid) -> Result<Task, QueueError> {
        self.get_task(task_id)
            .await?
            .ok_or(QueueError::TaskNotFound(task_id))
    }

    /// Returns whether a record exists for this task id.
    pub async fn task_exists(&self, task_id: Uuid) -> Result<bool, QueueError> {
        let mut conn = self.redis.clone();
        let exists: bool = conn.exists(task_key(task_id)).await?;
        Ok(exists)
    }

    /// Writes the status field directly, without touching queue membership.
    ///
    /// This bypasses the lifecycle transitions on purpose: workers use it
    /// for progress reporting between them. Taking [`TaskStatus`] keeps the
    /// stored value inside the decodable vocabulary.
    pub async fn set_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        conn.hset::<_, _, _, ()>(task_key(task_id), "status", status.as_str())
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Worker registry
    // ------------------------------------------------------------------

    /// Persists a worker registration record.
    pub async fn put_worker(&self, record: &WorkerRecord) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        conn.hset_multiple::<_, _, _, ()>(
            worker_key(record.worker_id),
            &record.to_hash_fields(),
        )
        .await?;
        Ok(())
    }

    /// Fetches a worker registration, or `None` if revoked/unknown.
    ///
    /// This lookup is the entire revocation model for worker credentials: a
    /// token whose subject has no record here is rejected.
    pub async fn get_worker(&self, worker_id: Uuid) -> Result<Option<WorkerRecord>, QueueError> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn.hgetall(worker_key(worker_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(WorkerRecord::from_hash(&fields)?))
    }

    /// Deletes a worker registration, revoking its credential.
    ///
    /// Returns `false` if no such worker existed.
    pub async fn delete_worker(&self, worker_id: Uuid) -> Result<bool, QueueError> {
        let mut conn = self.redis.clone();
        let deleted: u32 = conn.del(worker_key(worker_id)).await?;
        Ok(deleted > 0)
    }

    /// Updates the worker's `last_active` heartbeat timestamp.
    pub async fn touch_worker(&self, worker_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        conn.hset::<_, _, _, ()>(
            worker_key(worker_id),
            "last_active",
            chrono::Utc::now().to_rfc3339(),
        )
        .await?;
        Ok(())
    }

    /// Lists all registered workers by scanning the registry keyspace.
    pub async fn list_workers(&self) -> Result<Vec<WorkerRecord>, QueueError> {
        let mut conn = self.redis.clone();
        let keys: Vec<String> = {
            let mut iter: redis::AsyncIter<String> = conn.scan_match("worker:*").await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut conn = self.redis.clone();
        let mut workers = Vec::with_capacity(keys.len());
        for key in keys {
            let fields: HashMap<String, String> = conn.hgetall(&key).await?;
            if !fields.is_empty() {
                workers.push(WorkerRecord::from_hash(&fields)?);
            }
        }
        Ok(workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_naming() {
        let id = Uuid::nil();
        assert_eq!(
            task_key(id),
            "task:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            worker_key(id),
            "worker:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_queue_error_display() {
        let id = Uuid::new_v4();
        assert!(QueueError::TaskNotFound(id).to_string().contains("not found"));
        assert!(QueueError::DuplicateTask(id)
            .to_string()
            .contains("already exists"));
        assert!(QueueError::ConnectionFailed("timeout".to_string())
            .to_string()
            .contains("timeout"));
    }
}
