//! Bearer-token authentication middleware.
//!
//! Two populations, two schemes:
//!
//! - Workers present long-lived tokens signed with the worker key. The
//!   middleware verifies the signature, then confirms the worker still has a
//!   registration record — that lookup is the entire revocation model.
//! - Admins present time-bound tokens signed with the admin key; only
//!   signature, expiry, and subject are checked here.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::extract_bearer_token;
use crate::web::errors::ApiError;
use crate::web::state::AppState;

/// Authenticated worker identity, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    pub worker_id: Uuid,
    pub name: String,
}

/// Authenticated admin identity, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    pub username: String,
}

fn bearer_from_request(request: &Request) -> Result<&str, ApiError> {
    let header = request
        .headers()
        .get("authorization")
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;
    let header = header
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid authorization header".to_string()))?;
    Ok(extract_bearer_token(header)?)
}

/// Middleware guarding the worker gateway.
pub async fn require_worker_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_from_request(&request)?;
    let worker_id = state.tokens.verify_worker_token(token).map_err(|e| {
        warn!(error = %e, "Worker token validation failed");
        ApiError::Unauthorized("Could not validate credentials".to_string())
    })?;

    // A verified signature is not enough: the worker must still be
    // registered. Deleting the record revokes the token.
    let record = state
        .store
        .get_worker(worker_id)
        .await?
        .ok_or_else(ApiError::worker_not_found)?;

    debug!(worker_id = %worker_id, name = %record.name, "Authenticated worker request");
    request.extensions_mut().insert(WorkerIdentity {
        worker_id,
        name: record.name,
    });
    Ok(next.run(request).await)
}

/// Middleware guarding the admin API.
pub async fn require_admin_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_from_request(&request)?;
    let username = state.tokens.verify_admin_token(token).map_err(|e| {
        warn!(error = %e, "Admin token validation failed");
        ApiError::Unauthorized("Could not validate credentials".to_string())
    })?;

    debug!(username = %username, "Authenticated admin request");
    request.extensions_mut().insert(AdminIdentity { username });
    Ok(next.run(request).await)
}
