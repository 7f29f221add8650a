//! Liveness probe.

/// Handler for GET /health
///
/// Always returns "OK" while the process is serving requests.
#[tracing::instrument(skip_all, name = "recording.health.check")]
pub async fn health_check() -> &'static str {
    "OK"
}
