//! Redis-backed distributed task queue.
//!
//! This module is the core of the service: task records, queue structures,
//! lifecycle transitions, and the background reaper.
//!
//! - **TaskStore**: record primitives over Redis hashes
//! - **QueueEngine**: atomic lifecycle transitions between the pending,
//!   processing, and failed structures
//! - **Janitor**: background loop that reclaims expired leases
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────┐            ┌──────────────┐
//!   │  Producer    │            │   Workers    │
//!   │  (HTTP API)  │            │ (HTTP poll)  │
//!   └──────┬───────┘            └──────┬───────┘
//!          │ enqueue                   │ lease / complete / fail
//!          ▼                           ▼
//!   ┌─────────────────────────────────────────┐
//!   │               QueueEngine               │
//!   │  queue:pending → queue:processing → ✓/✗ │
//!   └──────────────────┬──────────────────────┘
//!                      │ expired leases
//!               ┌──────▼───────┐
//!               │   Janitor    │
//!               └──────────────┘
//! ```
//!
//! # Reliability
//!
//! - Every record+queue mutation is a single MULTI/EXEC pipeline
//! - `RPOP` leasing guarantees no task is handed to two pollers
//! - The janitor requeues or permanently fails tasks whose lease outlived
//!   the timeout, so a dead worker never strands work

pub mod engine;
pub mod janitor;
pub mod store;
pub mod task;

pub use engine::{eta_for_position, QueueEngine, QueuePlacement, QueueStats};
pub use janitor::{Janitor, JanitorConfig, ReapAction, ReapSummary};
pub use store::{QueueError, RetryPolicy, TaskStore};
pub use task::{Task, TaskDataError, TaskStatus, WorkerRecord};
