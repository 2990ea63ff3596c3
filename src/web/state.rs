//! Shared application state for the HTTP API.
//!
//! Constructed once at startup and cloned into every handler; no component
//! reaches for ambient globals.

use std::sync::Arc;

use crate::auth::TokenService;
use crate::captcha::CaptchaVerifier;
use crate::config::Settings;
use crate::queue::{QueueEngine, TaskStore};

/// Handles every handler needs, passed via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub store: TaskStore,
    pub engine: QueueEngine,
    pub tokens: TokenService,
    pub captcha: CaptchaVerifier,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(store: TaskStore, settings: Settings) -> Self {
        let engine = QueueEngine::new(store.clone(), settings.avg_wait_secs);
        let tokens = TokenService::new(&settings.worker_jwt_secret, &settings.admin_jwt_secret);
        let captcha = CaptchaVerifier::new(settings.turnstile_secret_key.clone());
        Self {
            store,
            engine,
            tokens,
            captcha,
            settings: Arc::new(settings),
        }
    }
}
