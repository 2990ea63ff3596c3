//! Task lifecycle engine with transactional queue transitions.
//!
//! Every transition that touches both a task record and a queue structure is
//! applied as one atomic MULTI/EXEC pipeline, so a task can never be observed
//! half-moved (record says STARTED while the id still sits in the pending
//! list). The single-key `RPOP` used by [`QueueEngine::lease`] is what makes
//! concurrent polling safe: Redis guarantees two poppers never receive the
//! same element.
//!
//! # State machine
//!
//! ```text
//! PENDING --(lease)--> STARTED --(complete)--> SUCCESS
//!                         |    \--(fail)-----> FAILURE --> queue:failed
//!                         |
//!                (janitor: lease expired)
//!                  /                 \
//!       retries < max           retries >= max
//!        -> PENDING               -> FAILURE
//! ```

use chrono::Utc;
use redis::AsyncCommands;
use tracing::{debug, warn};
use uuid::Uuid;

use super::store::{task_key, QueueError, TaskStore, FAILED_KEY, PENDING_KEY, PROCESSING_KEY};
use super::task::{Task, TaskStatus};

/// Computes a producer-facing wait estimate for a queue position.
pub fn eta_for_position(queue_position: u64, avg_wait_secs: i64) -> i64 {
    queue_position as i64 * avg_wait_secs
}

/// Queue depth snapshot.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
}

impl QueueStats {
    /// Total number of live (non-terminal-success) tasks tracked in queues.
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.failed
    }
}

/// Placement of a newly submitted task, returned to the producer.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QueuePlacement {
    pub queue_position: u64,
    pub estimated_time_seconds: i64,
}

/// Task lifecycle engine.
///
/// Cheap to clone; all state lives in Redis behind the shared store handle.
#[derive(Clone)]
pub struct QueueEngine {
    store: TaskStore,
    avg_wait_secs: i64,
}

impl QueueEngine {
    pub fn new(store: TaskStore, avg_wait_secs: i64) -> Self {
        Self {
            store,
            avg_wait_secs,
        }
    }

    /// Average per-task wait used for ETA estimates.
    pub fn avg_wait_secs(&self) -> i64 {
        self.avg_wait_secs
    }

    /// Creates a task record and appends it to the pending queue.
    ///
    /// Record creation and queue append are one transaction; a duplicate id
    /// is rejected before anything is written.
    pub async fn enqueue(&self, task: &Task) -> Result<(), QueueError> {
        if self.store.task_exists(task.task_id).await? {
            return Err(QueueError::DuplicateTask(task.task_id));
        }

        let mut conn = self.store.connection();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(task_key(task.task_id), &task.to_hash_fields())
            .lpush(PENDING_KEY, task.task_id.to_string());
        pipe.query_async::<_, ()>(&mut conn).await?;

        debug!(task_id = %task.task_id, "Task enqueued");
        Ok(())
    }

    /// Pops the next pending task id, or `None` when the queue is empty.
    ///
    /// `RPOP` is a single atomic command, so concurrent callers never
    /// receive the same id. The caller must follow up with
    /// [`start_processing`](Self::start_processing).
    pub async fn lease(&self) -> Result<Option<Uuid>, QueueError> {
        let mut conn = self.store.connection();
        let popped: Option<String> = conn.rpop(PENDING_KEY, None).await?;
        match popped {
            Some(raw) => {
                let task_id = Uuid::parse_str(&raw).map_err(|_| {
                    QueueError::CorruptRecord(super::task::TaskDataError::InvalidTaskId(raw))
                })?;
                Ok(Some(task_id))
            }
            None => Ok(None),
        }
    }

    /// Marks a leased task as started and assigns its worker.
    ///
    /// The processing-set score is the lease start instant; the janitor uses
    /// it to detect expired leases.
    pub async fn start_processing(&self, task_id: Uuid, worker_id: Uuid) -> Result<(), QueueError> {
        let now = Utc::now();
        let mut conn = self.store.connection();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .zadd(PROCESSING_KEY, task_id.to_string(), now.timestamp() as f64)
            .hset_multiple(
                task_key(task_id),
                &[
                    ("status", TaskStatus::Started.as_str().to_string()),
                    ("started_at", now.to_rfc3339()),
                    ("worker_id", worker_id.to_string()),
                ],
            );
        pipe.query_async::<_, ()>(&mut conn).await?;

        debug!(task_id = %task_id, worker_id = %worker_id, "Task leased");
        Ok(())
    }

    /// Records a successful completion.
    ///
    /// Removing from the processing set is a no-op when the id is no longer
    /// there (e.g. the janitor already reclaimed the lease); a late result
    /// from the original worker is accepted rather than rejected.
    pub async fn complete_task(
        &self,
        task_id: Uuid,
        result: &serde_json::Value,
    ) -> Result<(), QueueError> {
        let mut conn = self.store.connection();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(PROCESSING_KEY, task_id.to_string())
            .hset_multiple(
                task_key(task_id),
                &[
                    ("status", TaskStatus::Success.as_str().to_string()),
                    ("result", result.to_string()),
                    ("completed_at", Utc::now().to_rfc3339()),
                ],
            );
        pipe.query_async::<_, ()>(&mut conn).await?;

        debug!(task_id = %task_id, "Task completed");
        Ok(())
    }

    /// Records a permanent failure and moves the task to the failed set.
    pub async fn fail_task(&self, task_id: Uuid, traceback: &str) -> Result<(), QueueError> {
        let mut conn = self.store.connection();
        let retries: Option<u32> = conn.hget(task_key(task_id), "retries").await?;
        let retries = retries.unwrap_or(0) + 1;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(PROCESSING_KEY, task_id.to_string())
            .zadd(
                FAILED_KEY,
                task_id.to_string(),
                Utc::now().timestamp() as f64,
            )
            .hset_multiple(
                task_key(task_id),
                &[
                    ("status", TaskStatus::Failure.as_str().to_string()),
                    ("traceback", traceback.to_string()),
                    ("retries", retries.to_string()),
                ],
            );
        pipe.query_async::<_, ()>(&mut conn).await?;

        warn!(task_id = %task_id, retries, "Task failed");
        Ok(())
    }

    /// Reclaims an expired lease: back to pending with the retry counter
    /// incremented. Janitor-only path.
    pub async fn reclaim_task(&self, task_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.store.connection();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(PROCESSING_KEY, task_id.to_string())
            .lpush(PENDING_KEY, task_id.to_string())
            .hincr(task_key(task_id), "retries", 1)
            .hset(
                task_key(task_id),
                "status",
                TaskStatus::Pending.as_str(),
            );
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    /// Moves a failed task back to pending.
    ///
    /// A deliberate manual transition out of the FAILURE terminal state,
    /// used for single-task admin retry and bulk retry-all.
    pub async fn requeue(&self, task_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.store.connection();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(FAILED_KEY, task_id.to_string())
            .lpush(PENDING_KEY, task_id.to_string())
            .hset(
                task_key(task_id),
                "status",
                TaskStatus::Pending.as_str(),
            );
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    /// Requeues every task in the failed set, returning the count moved.
    ///
    /// Idempotent: a second call against the now-empty set returns 0.
    pub async fn requeue_all_failed(&self) -> Result<usize, QueueError> {
        let mut conn = self.store.connection();
        let failed: Vec<String> = conn.zrange(FAILED_KEY, 0, -1).await?;

        let mut moved = 0;
        for raw in failed {
            match Uuid::parse_str(&raw) {
                Ok(task_id) => {
                    self.requeue(task_id).await?;
                    moved += 1;
                }
                Err(_) => warn!(entry = %raw, "Skipping non-uuid entry in failed set"),
            }
        }
        Ok(moved)
    }

    /// Returns whether the task currently sits in the failed set.
    pub async fn is_failed(&self, task_id: Uuid) -> Result<bool, QueueError> {
        let mut conn = self.store.connection();
        let score: Option<f64> = conn.zscore(FAILED_KEY, task_id.to_string()).await?;
        Ok(score.is_some())
    }

    /// Task ids whose lease started at or before the cutoff (unix seconds).
    pub async fn expired_leases(&self, cutoff: i64) -> Result<Vec<Uuid>, QueueError> {
        let mut conn = self.store.connection();
        let entries: Vec<String> = conn
            .zrangebyscore(PROCESSING_KEY, 0f64, cutoff as f64)
            .await?;

        Ok(entries
            .into_iter()
            .filter_map(|raw| match Uuid::parse_str(&raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(entry = %raw, "Skipping non-uuid entry in processing set");
                    None
                }
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Depth queries and ETA estimation
    // ------------------------------------------------------------------

    /// Snapshot of all three queue depths, fetched in one pipeline.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let mut conn = self.store.connection();
        let mut pipe = redis::pipe();
        pipe.llen(PENDING_KEY)
            .zcard(PROCESSING_KEY)
            .zcard(FAILED_KEY);
        let (pending, processing, failed): (u64, u64, u64) =
            pipe.query_async(&mut conn).await?;

        Ok(QueueStats {
            pending,
            processing,
            failed,
        })
    }

    /// Computes the placement a task submitted right now would get.
    ///
    /// Position counts everything ahead of it: the pending backlog plus
    /// whatever is currently being processed, plus itself.
    pub async fn submission_placement(&self) -> Result<QueuePlacement, QueueError> {
        let stats = self.stats().await?;
        let queue_position = stats.pending + stats.processing + 1;
        Ok(QueuePlacement {
            queue_position,
            estimated_time_seconds: eta_for_position(queue_position, self.avg_wait_secs),
        })
    }

    /// 1-based position of a pending task, counted from the consuming end.
    ///
    /// Returns `None` if the id is not in the pending list (already leased,
    /// finished, or unknown). Advisory only; the value changes as the queue
    /// drains or grows between polls.
    pub async fn queue_position(&self, task_id: Uuid) -> Result<Option<u64>, QueueError> {
        let mut conn = self.store.connection();
        let pending: Vec<String> = conn.lrange(PENDING_KEY, 0, -1).await?;
        let wanted = task_id.to_string();

        // LPUSH inserts at index 0 and RPOP consumes from the tail, so the
        // next task to be leased is the last element of the range.
        Ok(pending
            .iter()
            .position(|entry| *entry == wanted)
            .map(|idx| (pending.len() - idx) as u64))
    }

    /// Fresh advisory ETA for a still-pending task.
    pub async fn pending_eta(&self, task_id: Uuid) -> Result<Option<i64>, QueueError> {
        Ok(self
            .queue_position(task_id)
            .await?
            .map(|pos| eta_for_position(pos, self.avg_wait_secs)))
    }

    /// Lists task records for the admin dashboard.
    ///
    /// Unfiltered listing prioritizes failed, then processing, then pending.
    /// Redis is not built for combined pagination over these structures, so
    /// this is a bounded best-effort view.
    pub async fn list_tasks(
        &self,
        limit: usize,
        status: Option<&str>,
    ) -> Result<Vec<Task>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.store.connection();
        // Redis ranges are inclusive; -1 would mean "to the end", which the
        // zero guard above rules out.
        let end = limit as isize - 1;

        let ids: Vec<String> = match status {
            Some("pending") => conn.lrange(PENDING_KEY, 0, end).await?,
            Some("processing") => conn.zrange(PROCESSING_KEY, 0, end).await?,
            Some("failed") => conn.zrange(FAILED_KEY, 0, end).await?,
            _ => {
                let failed: Vec<String> = conn.zrange(FAILED_KEY, 0, end).await?;
                let processing: Vec<String> = conn.zrange(PROCESSING_KEY, 0, end).await?;
                let pending: Vec<String> = conn.lrange(PENDING_KEY, 0, end).await?;
                failed
                    .into_iter()
                    .chain(processing)
                    .chain(pending)
                    .take(limit)
                    .collect()
            }
        };

        let mut tasks = Vec::with_capacity(ids.len());
        for raw in ids {
            let Ok(task_id) = Uuid::parse_str(&raw) else {
                continue;
            };
            if let Some(task) = self.store.get_task(task_id).await? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }
}
