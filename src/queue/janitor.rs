//! Background reaper for zombie tasks.
//!
//! Workers die. When one does mid-task, its lease sits in the processing set
//! forever unless someone notices. The janitor scans for leases older than
//! the configured timeout and either pushes the task back to pending (under
//! the retry budget) or fails it permanently.
//!
//! The loop must never die: any error in a scan is logged and the loop
//! retries after a longer backoff sleep. A dead janitor means zombie tasks
//! accumulate unbounded.

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::engine::QueueEngine;
use super::store::{QueueError, TaskStore};

/// What to do with an expired lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapAction {
    /// Push back to pending and increment the retry counter.
    Requeue,
    /// Retry budget exhausted; fail permanently.
    Fail,
}

impl ReapAction {
    /// Decides the action for a task with the given retry count.
    pub fn for_retries(retries: u32, max_retries: u32) -> Self {
        if retries >= max_retries {
            ReapAction::Fail
        } else {
            ReapAction::Requeue
        }
    }
}

/// Outcome of one janitor pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReapSummary {
    /// Expired leases pushed back to pending.
    pub requeued: usize,
    /// Expired leases failed permanently.
    pub failed: usize,
}

impl ReapSummary {
    pub fn total(&self) -> usize {
        self.requeued + self.failed
    }
}

/// Configuration for the janitor loop.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    /// Lease age beyond which a task counts as a zombie.
    pub task_timeout: Duration,
    /// Retry budget before an expired lease becomes a permanent failure.
    pub max_task_retries: u32,
    /// Steady-state sleep between scans.
    pub scan_interval: Duration,
    /// Sleep after a scan error.
    pub error_backoff: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(30),
            max_task_retries: 1,
            scan_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(60),
        }
    }
}

/// The zombie-task reaper.
pub struct Janitor {
    engine: QueueEngine,
    store: TaskStore,
    config: JanitorConfig,
}

impl Janitor {
    pub fn new(engine: QueueEngine, store: TaskStore, config: JanitorConfig) -> Self {
        Self {
            engine,
            store,
            config,
        }
    }

    /// Runs the reap loop forever.
    pub async fn run(&self) {
        info!(
            timeout_secs = self.config.task_timeout.as_secs(),
            max_retries = self.config.max_task_retries,
            "Janitor started"
        );

        loop {
            match self.scan_once().await {
                Ok(summary) => {
                    if summary.total() > 0 {
                        info!(
                            requeued = summary.requeued,
                            failed = summary.failed,
                            "Janitor pass reclaimed zombie tasks"
                        );
                    }
                    tokio::time::sleep(self.config.scan_interval).await;
                }
                Err(e) => {
                    error!(error = %e, "Janitor scan failed; backing off");
                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }
    }

    /// One pass over the processing set.
    pub async fn scan_once(&self) -> Result<ReapSummary, QueueError> {
        let cutoff = Utc::now().timestamp() - self.config.task_timeout.as_secs() as i64;
        let zombies = self.engine.expired_leases(cutoff).await?;

        let mut summary = ReapSummary::default();
        for task_id in zombies {
            match self.reap(task_id).await {
                Ok(ReapAction::Requeue) => summary.requeued += 1,
                Ok(ReapAction::Fail) => summary.failed += 1,
                // Keep going; one broken record must not stall the pass.
                Err(e) => warn!(task_id = %task_id, error = %e, "Failed to reap zombie task"),
            }
        }
        Ok(summary)
    }

    /// Reaps a single zombie task and reports which way it went.
    async fn reap(&self, task_id: Uuid) -> Result<ReapAction, QueueError> {
        let retries = match self.store.get_task(task_id).await? {
            Some(task) => task.retries,
            // Record vanished while leased; nothing to retry.
            None => 0,
        };

        let action = ReapAction::for_retries(retries, self.config.max_task_retries);
        match action {
            ReapAction::Fail => {
                let traceback = format!(
                    "Zombie task: worker died, max retries ({}) exceeded",
                    self.config.max_task_retries
                );
                self.engine.fail_task(task_id, &traceback).await?;
                warn!(task_id = %task_id, retries, "Failed zombie task");
            }
            ReapAction::Requeue => {
                self.engine.reclaim_task(task_id).await?;
                info!(
                    task_id = %task_id,
                    retry = retries + 1,
                    max = self.config.max_task_retries,
                    "Rescued zombie task"
                );
            }
        }
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reap_action_under_budget() {
        assert_eq!(ReapAction::for_retries(0, 1), ReapAction::Requeue);
        assert_eq!(ReapAction::for_retries(2, 3), ReapAction::Requeue);
    }

    #[test]
    fn test_reap_action_budget_exhausted() {
        assert_eq!(ReapAction::for_retries(1, 1), ReapAction::Fail);
        assert_eq!(ReapAction::for_retries(5, 3), ReapAction::Fail);
    }

    #[test]
    fn test_reap_action_zero_budget_always_fails() {
        assert_eq!(ReapAction::for_retries(0, 0), ReapAction::Fail);
    }

    #[test]
    fn test_reap_sequence_with_budget_of_one() {
        // First expiry requeues (0 < 1), second expiry fails (1 >= 1).
        assert_eq!(ReapAction::for_retries(0, 1), ReapAction::Requeue);
        assert_eq!(ReapAction::for_retries(1, 1), ReapAction::Fail);
    }

    #[test]
    fn test_summary_totals() {
        let summary = ReapSummary {
            requeued: 3,
            failed: 2,
        };
        assert_eq!(summary.total(), 5);
        assert_eq!(ReapSummary::default().total(), 0);
    }

    #[test]
    fn test_janitor_config_defaults() {
        let config = JanitorConfig::default();
        assert_eq!(config.task_timeout, Duration::from_secs(30));
        assert_eq!(config.max_task_retries, 1);
        assert!(config.error_backoff > config.scan_interval);
    }
}
