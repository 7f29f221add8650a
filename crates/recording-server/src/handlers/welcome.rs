//! Unauthenticated version probe used by backends to check the server.

use crate::models::WelcomeResponse;
use axum::Json;

/// Handler for GET /api/v1/welcome
///
/// ```json
/// { "version": "0.1.0" }
/// ```
#[tracing::instrument(skip_all, name = "recording.welcome")]
pub async fn welcome() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
