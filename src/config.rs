//! Environment-driven configuration.
//!
//! Settings are loaded once at startup and passed by handle into every
//! component that needs them. Missing required variables are a startup
//! error, never a panic.

use std::time::Duration;

use thiserror::Error;

use crate::queue::{JanitorConfig, RetryPolicy};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVariable(&'static str),

    #[error("Invalid value for {variable}: {message}")]
    InvalidValue {
        variable: &'static str,
        message: String,
    },
}

/// Runtime settings for the service.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Redis connection URL.
    pub redis_url: String,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Signing key for long-lived worker tokens.
    pub worker_jwt_secret: String,
    /// Signing key shared with the admin identity provider.
    pub admin_jwt_secret: String,
    /// Turnstile secret; `None` disables bot verification (development).
    pub turnstile_secret_key: Option<String>,
    /// Average per-task processing time used for ETA estimates.
    pub avg_wait_secs: i64,
    /// Lease age after which the janitor treats a task as a zombie.
    pub task_timeout_secs: u64,
    /// Janitor retry budget before an expired lease fails permanently.
    pub max_task_retries: u32,
    /// Initial Redis connection attempts.
    pub redis_retry_max_attempts: u32,
    /// Delay before the first Redis connection retry.
    pub redis_retry_base_delay: Duration,
}

impl Settings {
    /// Loads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            redis_url: require("REDIS_URL")?,
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            worker_jwt_secret: require("WORKER_JWT_SECRET")?,
            admin_jwt_secret: require("ADMIN_JWT_SECRET")?,
            turnstile_secret_key: optional("TURNSTILE_SECRET_KEY"),
            avg_wait_secs: parsed("AVG_WAIT_TIME_SECONDS", 5)?,
            task_timeout_secs: parsed("TASK_TIMEOUT_SECONDS", 30)?,
            max_task_retries: parsed("MAX_TASK_RETRIES", 1)?,
            redis_retry_max_attempts: parsed("REDIS_RETRY_MAX_ATTEMPTS", 5)?,
            redis_retry_base_delay: Duration::from_millis(parsed(
                "REDIS_RETRY_BASE_DELAY_MS",
                1000,
            )?),
        })
    }

    /// Connection retry policy derived from these settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.redis_retry_max_attempts,
            base_delay: self.redis_retry_base_delay,
        }
    }

    /// Janitor configuration derived from these settings.
    pub fn janitor_config(&self) -> JanitorConfig {
        JanitorConfig {
            task_timeout: Duration::from_secs(self.task_timeout_secs),
            max_task_retries: self.max_task_retries,
            ..JanitorConfig::default()
        }
    }
}

fn optional(variable: &'static str) -> Option<String> {
    std::env::var(variable).ok().filter(|v| !v.is_empty())
}

fn require(variable: &'static str) -> Result<String, ConfigError> {
    optional(variable).ok_or(ConfigError::MissingVariable(variable))
}

fn parsed<T: std::str::FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(variable) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            variable,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> Settings {
        Settings {
            redis_url: "redis://localhost:6379".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            worker_jwt_secret: "w".to_string(),
            admin_jwt_secret: "a".to_string(),
            turnstile_secret_key: None,
            avg_wait_secs: 5,
            task_timeout_secs: 30,
            max_task_retries: 1,
            redis_retry_max_attempts: 5,
            redis_retry_base_delay: Duration::from_millis(1000),
        }
    }

    #[test]
    fn test_retry_policy_derivation() {
        let settings = base_settings();
        let policy = settings.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_janitor_config_derivation() {
        let mut settings = base_settings();
        settings.task_timeout_secs = 120;
        settings.max_task_retries = 3;

        let config = settings.janitor_config();
        assert_eq!(config.task_timeout, Duration::from_secs(120));
        assert_eq!(config.max_task_retries, 3);
        // Loop cadence keeps its defaults.
        assert_eq!(config.scan_interval, Duration::from_secs(30));
        assert_eq!(config.error_backoff, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_variable_error_names_it() {
        let err = ConfigError::MissingVariable("REDIS_URL");
        assert!(err.to_string().contains("REDIS_URL"));
    }
}
