//! HTTP error mapping.
//!
//! Every failure surfaced by the core maps onto one API error with a fixed
//! status code. Backend failures are never swallowed; they surface as 5xx.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;
use crate::captcha::CaptchaError;
use crate::queue::QueueError;

/// Web API errors with HTTP status mappings.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn task_not_found() -> Self {
        ApiError::NotFound("Task not found".to_string())
    }

    pub fn worker_not_found() -> Self {
        ApiError::NotFound("Worker not found".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::TaskNotFound(_) => ApiError::task_not_found(),
            QueueError::WorkerNotFound(_) => ApiError::worker_not_found(),
            QueueError::DuplicateTask(id) => {
                ApiError::BadRequest(format!("Task {id} already exists"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Unauthorized(e.to_string())
    }
}

impl From<CaptchaError> for ApiError {
    fn from(e: CaptchaError) -> Self {
        match e {
            CaptchaError::MissingToken => ApiError::BadRequest(e.to_string()),
            CaptchaError::Rejected => {
                ApiError::Forbidden("Turnstile verification failed".to_string())
            }
            CaptchaError::ServiceUnavailable(_) => ApiError::ServiceUnavailable(
                "Captcha verification service unavailable".to_string(),
            ),
        }
    }
}

/// Convenience alias for handler results.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            ApiError::task_not_found().status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_queue_error_conversion() {
        let id = Uuid::new_v4();
        assert_eq!(
            ApiError::from(QueueError::TaskNotFound(id)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(QueueError::DuplicateTask(id)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(QueueError::ConnectionFailed("down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_captcha_rejection_is_forbidden() {
        assert_eq!(
            ApiError::from(CaptchaError::Rejected).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_auth_error_is_unauthorized() {
        assert_eq!(
            ApiError::from(AuthError::MissingAuthHeader).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
