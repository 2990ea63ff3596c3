//! voicecheck: Redis-backed distributed task queue for voice-analysis jobs.
//!
//! Producers submit tasks over HTTP, independent worker processes pull them
//! through an authenticated gateway, and a background janitor reclaims work
//! from workers that died mid-task.

// Core modules
pub mod auth;
pub mod captcha;
pub mod cli;
pub mod config;
pub mod queue;
pub mod web;

// Re-export commonly used types
pub use config::{ConfigError, Settings};
pub use queue::{QueueEngine, QueueError, TaskStore};
