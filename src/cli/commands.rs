//! CLI command definitions and dispatch.

use clap::{Parser, Subcommand};
use tracing::info;

use crate::auth::{hash_token, TokenService};
use crate::config::Settings;
use crate::queue::{Janitor, QueueEngine, TaskStore, WorkerRecord};
use crate::web::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "voicecheck",
    about = "Redis-backed distributed task queue for voice-analysis jobs",
    version
)]
pub struct Cli {
    /// Log level (overridden by RUST_LOG when set)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve {
        /// Also run the zombie-task janitor inside this process
        #[arg(long)]
        with_janitor: bool,
    },
    /// Run the zombie-task janitor loop on its own
    Janitor,
    /// Register a worker and print its credential (printed exactly once)
    RegisterWorker {
        /// Human-readable worker label
        #[arg(long)]
        name: String,
    },
    /// Print queue depth statistics as JSON
    Stats,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the selected command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let store = TaskStore::connect(&settings.redis_url, settings.retry_policy()).await?;

    match cli.command {
        Command::Serve { with_janitor } => {
            let state = AppState::new(store.clone(), settings.clone());

            if with_janitor {
                let janitor =
                    Janitor::new(state.engine.clone(), store, settings.janitor_config());
                tokio::spawn(async move { janitor.run().await });
            }

            crate::web::serve(state).await
        }
        Command::Janitor => {
            let engine = QueueEngine::new(store.clone(), settings.avg_wait_secs);
            let janitor = Janitor::new(engine, store, settings.janitor_config());
            janitor.run().await;
            Ok(())
        }
        Command::RegisterWorker { name } => {
            let tokens =
                TokenService::new(&settings.worker_jwt_secret, &settings.admin_jwt_secret);
            let worker_id = uuid::Uuid::new_v4();
            let token = tokens.issue_worker_token(worker_id)?;

            let record = WorkerRecord::new(worker_id, name, hash_token(&token));
            store.put_worker(&record).await?;

            info!(worker_id = %worker_id, "Worker registered");
            println!("worker_id: {worker_id}");
            println!("worker_token: {token}");
            Ok(())
        }
        Command::Stats => {
            let engine = QueueEngine::new(store, settings.avg_wait_secs);
            let stats = engine.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from(["voicecheck", "serve", "--with-janitor"]).expect("parse");
        assert!(matches!(
            cli.command,
            Command::Serve { with_janitor: true }
        ));
    }

    #[test]
    fn test_register_worker_requires_name() {
        assert!(Cli::try_parse_from(["voicecheck", "register-worker"]).is_err());
        let cli = Cli::try_parse_from(["voicecheck", "register-worker", "--name", "gpu-1"])
            .expect("parse");
        assert!(matches!(cli.command, Command::RegisterWorker { name } if name == "gpu-1"));
    }
}
