//! Webhook request authentication.
//!
//! A request is accepted only when every gate passes, in this order:
//!
//! 1. `Talk-Recording-Backend` is present
//! 2. a secret is configured for that backend
//! 3. `Talk-Recording-Random` and `Talk-Recording-Checksum` are present
//! 4. the declared `Content-Length` is non-zero and within the backend limit
//! 5. the checksum over `random || body` matches
//! 6. the body is a valid room request
//!
//! Each rejection is logged with its reason; the caller only sees the status.

use super::checksum::verify_checksum;
use crate::errors::RecordingError;
use crate::models::RoomRequest;
use crate::observability::metrics::record_webhook_rejection;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

pub const BACKEND_HEADER: &str = "talk-recording-backend";
pub const RANDOM_HEADER: &str = "talk-recording-random";
pub const CHECKSUM_HEADER: &str = "talk-recording-checksum";

/// Lookup of backend secrets and limits.
pub trait BackendDirectory: Send + Sync {
    /// Shared secret of the backend, if it is allowed at all.
    fn secret(&self, backend: &str) -> Option<&SecretString>;

    /// Maximum accepted body size in bytes.
    fn max_message_size(&self, backend: &str) -> u64;
}

fn reject_forbidden(reason: &'static str, message: &str) -> RecordingError {
    record_webhook_rejection(reason);
    RecordingError::Forbidden(message.to_string())
}

fn reject_bad_request(reason: &'static str, message: &str) -> RecordingError {
    record_webhook_rejection(reason);
    RecordingError::BadRequest(message.to_string())
}

/// Authenticate a webhook request and parse its body.
///
/// # Returns
///
/// The backend id (as sent in `Talk-Recording-Backend`) and the parsed body.
///
/// # Errors
///
/// - `RecordingError::Forbidden` for missing headers, unknown backends and
///   checksum mismatches
/// - `RecordingError::BadRequest` for missing, zero or oversized bodies and
///   bodies that are not a valid room request
pub async fn authenticate<D>(
    backends: &D,
    headers: &HeaderMap,
    body: Body,
) -> Result<(String, RoomRequest), RecordingError>
where
    D: BackendDirectory + ?Sized,
{
    let Some(backend) = headers.get(BACKEND_HEADER) else {
        warn!(target: "recording.auth", "Missing Talk-Recording-Backend header");
        return Err(reject_forbidden("missing_backend", "missing backend header"));
    };
    let Ok(backend) = backend.to_str() else {
        warn!(target: "recording.auth", "Talk-Recording-Backend header is not valid text");
        return Err(reject_forbidden("missing_backend", "invalid backend header"));
    };

    let secret = match backends.secret(backend) {
        Some(secret) if !secret.expose_secret().is_empty() => secret,
        _ => {
            warn!(target: "recording.auth", backend = %backend, "No secret configured for backend");
            return Err(reject_forbidden("unknown_backend", "no secret configured"));
        }
    };

    let Some(random) = headers.get(RANDOM_HEADER) else {
        warn!(target: "recording.auth", backend = %backend, "Missing Talk-Recording-Random header");
        return Err(reject_forbidden("missing_random", "missing random header"));
    };

    let Some(checksum) = headers.get(CHECKSUM_HEADER) else {
        warn!(target: "recording.auth", backend = %backend, "Missing Talk-Recording-Checksum header");
        return Err(reject_forbidden("missing_checksum", "missing checksum header"));
    };

    let max_message_size = backends.max_message_size(backend);
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    match content_length {
        Some(length) if length > 0 && length <= max_message_size => {}
        _ => {
            warn!(
                target: "recording.auth",
                backend = %backend,
                content_length = ?content_length,
                max_message_size = max_message_size,
                "Message size above limit"
            );
            return Err(reject_bad_request("message_size", "message too large"));
        }
    }

    let limit = usize::try_from(max_message_size).unwrap_or(usize::MAX);
    let body = to_bytes(body, limit).await.map_err(|e| {
        warn!(
            target: "recording.auth",
            backend = %backend,
            error = %e,
            "Failed to read message body within limit"
        );
        reject_bad_request("message_size", "message too large")
    })?;

    if !verify_checksum(
        secret.expose_secret(),
        random.as_bytes(),
        &body,
        checksum.as_bytes(),
    ) {
        warn!(target: "recording.auth", backend = %backend, "Checksum verification failed");
        return Err(reject_forbidden("checksum", "checksum verification failed"));
    }

    let request: RoomRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(target: "recording.auth", backend = %backend, error = %e, "Invalid request body");
        reject_bad_request("invalid_body", "invalid request body")
    })?;

    Ok((backend.to_string(), request))
}
