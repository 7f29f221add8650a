//! Prometheus metrics endpoint handler.
//!
//! Access is restricted by `require_stats_access`; the handler itself does
//! no checks. Metrics carry no secrets, only bounded operational labels.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns 200 OK with Prometheus text format:
/// ```text
/// # TYPE recording_current_recordings gauge
/// recording_current_recordings{backend="cloud"} 1
/// ```
#[tracing::instrument(skip_all, name = "recording.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[tokio::test]
    async fn test_metrics_handler_renders_recorded_metrics() {
        // Built but not installed, so tests do not fight over the global recorder.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("recording_recordings_total", "backend" => "b").increment(2);
        });

        let response = metrics_handler(State(handle)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("recording_recordings_total{backend=\"b\"} 2"));
    }
}
