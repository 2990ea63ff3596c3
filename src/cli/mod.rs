//! Command-line interface for voicecheck.
//!
//! Provides commands for serving the API, running the janitor, registering
//! workers, and inspecting queue depths.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Command};
