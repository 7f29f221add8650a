//! Access control for the metrics endpoint.

use crate::net::{ClientAddress, TrustedNetworkSet};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Allow the request only if its resolved client address is in `allowed`.
///
/// Must run after `resolve_client`. Rejections are a bare 403 with an empty
/// body.
pub async fn require_stats_access(
    State(allowed): State<Arc<TrustedNetworkSet>>,
    req: Request,
    next: Next,
) -> Response {
    let client = req.extensions().get::<ClientAddress>().cloned();

    match client.as_ref().and_then(ClientAddress::ip) {
        Some(ip) if allowed.contains(ip) => next.run(req).await,
        _ => {
            warn!(
                target: "recording.net",
                client = client.as_ref().map(|c| c.0.as_str()),
                "Metrics requested by a client that is not allowed"
            );
            StatusCode::FORBIDDEN.into_response()
        }
    }
}
