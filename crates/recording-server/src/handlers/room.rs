//! Room webhook handler.
//!
//! The backend asks the server to start or stop recording a room. The
//! request is authenticated before anything else, and the registry answers
//! immediately; the actual start or stop runs in the background.

use crate::auth::authenticate;
use crate::errors::RecordingError;
use crate::jobs::{JobKey, JobSpec, StartOutcome, StopOutcome};
use crate::models::{EmptyResponse, RoomRequest, StartRequest, StopRequest};
use crate::routes::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Handler for POST /api/v1/room/:token
///
/// # Response
///
/// - `200 {}` when the request was accepted or was a no-op
/// - `400` for oversized or malformed bodies and unknown recording status
/// - `403` when authentication fails
/// - `404` when stopping a room that is not being recorded
#[instrument(skip_all, name = "recording.room", fields(token = %token))]
pub async fn room_request(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<EmptyResponse>, RecordingError> {
    let (backend, request) = authenticate(state.config.as_ref(), &headers, body).await?;

    match request {
        RoomRequest::Start { start } => start_recording(&state, backend, token, start).await?,
        RoomRequest::Stop { stop } => stop_recording(&state, backend, token, stop).await?,
    }

    Ok(Json(EmptyResponse {}))
}

async fn start_recording(
    state: &AppState,
    backend: String,
    token: String,
    start: StartRequest,
) -> Result<(), RecordingError> {
    let Some(mode) = start.mode() else {
        warn!(
            target: "recording.jobs",
            backend = %backend,
            token = %token,
            status = ?start.status,
            "Unknown recording status"
        );
        return Err(RecordingError::BadRequest("unknown recording status".to_string()));
    };

    let spec = JobSpec {
        backend_id: state.config.backend_metrics_label(&backend).to_string(),
        backend,
        token,
        mode,
        owner: start.owner,
    };

    // Both outcomes answer 200; the registry logs which one it was.
    let _: StartOutcome = state.registry.try_start(spec, start.actor).await;

    Ok(())
}

async fn stop_recording(
    state: &AppState,
    backend: String,
    token: String,
    stop: StopRequest,
) -> Result<(), RecordingError> {
    let key = JobKey::new(backend, token);

    match state.registry.try_stop(&key, stop.actor()).await {
        StopOutcome::Accepted | StopOutcome::AlreadyStopping => Ok(()),
        StopOutcome::NotFound => Err(RecordingError::NotFound("recording".to_string())),
    }
}
