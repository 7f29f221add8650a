//! Recording server error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Error messages returned to clients are intentionally generic: the webhook
//! caller must not learn which authentication gate rejected it. The specific
//! reason is logged server-side where the error is raised.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Recording server error type.
///
/// Maps to appropriate HTTP status codes:
/// - BadRequest: 400 Bad Request
/// - Forbidden: 403 Forbidden
/// - NotFound: 404 Not Found
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl RecordingError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            RecordingError::BadRequest(_) => 400,
            RecordingError::Forbidden(_) => 403,
            RecordingError::NotFound(_) => 404,
            RecordingError::Internal(_) => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for RecordingError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            RecordingError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", "Bad request")
            }
            RecordingError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", "Forbidden"),
            RecordingError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", "Not found"),
            RecordingError::Internal(reason) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "recording.errors", reason = %reason, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred",
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail { code, message },
        };

        (status, Json(error_response)).into_response()
    }
}
