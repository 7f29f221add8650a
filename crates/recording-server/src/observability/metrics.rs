//! Metrics definitions for the recording server.
//!
//! All metrics follow Prometheus naming conventions:
//! - `recording_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: HTTP methods
//! - `endpoint`: 5 values (parameterized paths, everything else is `/other`)
//! - `status`: 3 values (success, error, timeout)
//! - `backend`: configured backend ids, everything else is `other`
//! - `operation`: `start`, `stop`
//! - `reason`: bounded by the webhook authentication gates

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("recording_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `recording_http_requests_total`, `recording_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("recording_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("recording_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
///
/// Room tokens are replaced with a placeholder.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/api/v1/welcome" => "/api/v1/welcome",
        _ => {
            let is_room = path
                .strip_prefix("/api/v1/room/")
                .is_some_and(|token| !token.is_empty() && !token.contains('/'));
            if is_room {
                "/api/v1/room/{token}"
            } else {
                "/other"
            }
        }
    }
}

// ============================================================================
// Recording Metrics
// ============================================================================

/// Record an accepted start request.
///
/// Metric: `recording_current_recordings` (gauge, +1), `recording_recordings_total`
/// Labels: `backend`
pub fn record_recording_started(backend: &str) {
    gauge!("recording_current_recordings", "backend" => backend.to_string()).increment(1.0);
    counter!("recording_recordings_total", "backend" => backend.to_string()).increment(1);
}

/// Record a recording leaving the registry (stopped, failed or drained).
///
/// Metric: `recording_current_recordings` (gauge, -1)
/// Labels: `backend`
pub fn record_recording_finished(backend: &str) {
    gauge!("recording_current_recordings", "backend" => backend.to_string()).decrement(1.0);
}

/// Record a failed background start or stop.
///
/// Metric: `recording_job_failures_total`
/// Labels: `operation`
pub fn record_job_failure(operation: &'static str) {
    counter!("recording_job_failures_total", "operation" => operation).increment(1);
}

/// Record a rejected webhook request.
///
/// Metric: `recording_webhook_rejections_total`
/// Labels: `reason`
pub fn record_webhook_rejection(reason: &'static str) {
    counter!("recording_webhook_rejections_total", "reason" => reason).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

    fn find<'a>(
        snapshot: &'a [(String, Vec<(String, String)>, DebugValue)],
        name: &str,
        label: (&str, &str),
    ) -> Option<&'a DebugValue> {
        snapshot
            .iter()
            .find(|(metric, labels, _)| {
                metric == name
                    && labels
                        .iter()
                        .any(|(key, value)| key == label.0 && value == label.1)
            })
            .map(|(_, _, value)| value)
    }

    fn flatten(snapshotter: &Snapshotter) -> Vec<(String, Vec<(String, String)>, DebugValue)> {
        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(composite, _, _, value)| {
                let key = composite.key();
                let labels = key
                    .labels()
                    .map(|label| (label.key().to_string(), label.value().to_string()))
                    .collect();
                (key.name().to_string(), labels, value)
            })
            .collect()
    }

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, Duration::from_millis(5));
        record_http_request("GET", "/api/v1/welcome", 200, Duration::from_millis(3));
        record_http_request("POST", "/api/v1/room/abc123", 200, Duration::from_millis(20));
        record_http_request("POST", "/api/v1/room/abc123", 403, Duration::from_millis(2));
        record_http_request("GET", "/metrics", 403, Duration::from_millis(1));
        record_http_request("GET", "/api/v1/room/abc123", 504, Duration::from_secs(30));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(299), "success");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
        assert_eq!(categorize_status_code(400), "error");
        assert_eq!(categorize_status_code(403), "error");
        assert_eq!(categorize_status_code(500), "error");
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(normalize_endpoint("/api/v1/welcome"), "/api/v1/welcome");
        assert_eq!(normalize_endpoint("/api/v1/room/abc123"), "/api/v1/room/{token}");
        assert_eq!(normalize_endpoint("/api/v1/room/"), "/other");
        assert_eq!(normalize_endpoint("/api/v1/room/abc/def"), "/other");
        assert_eq!(normalize_endpoint("/unknown"), "/other");
        assert_eq!(normalize_endpoint("/"), "/other");
    }

    #[test]
    fn test_recording_gauge_and_counter() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_recording_started("cloud");
            record_recording_started("cloud");
            record_recording_finished("cloud");
        });

        let snapshot = flatten(&snapshotter);
        let backend = ("backend", "cloud");

        assert!(matches!(
            find(&snapshot, "recording_current_recordings", backend),
            Some(DebugValue::Gauge(value)) if value.into_inner() == 1.0
        ));
        assert!(matches!(
            find(&snapshot, "recording_recordings_total", backend),
            Some(DebugValue::Counter(2))
        ));
    }

    #[test]
    fn test_failure_and_rejection_counters() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_job_failure("start");
            record_job_failure("stop");
            record_job_failure("stop");
            record_webhook_rejection("checksum");
        });

        let snapshot = flatten(&snapshotter);

        assert!(matches!(
            find(&snapshot, "recording_job_failures_total", ("operation", "start")),
            Some(DebugValue::Counter(1))
        ));
        assert!(matches!(
            find(&snapshot, "recording_job_failures_total", ("operation", "stop")),
            Some(DebugValue::Counter(2))
        ));
        assert!(matches!(
            find(&snapshot, "recording_webhook_rejections_total", ("reason", "checksum")),
            Some(DebugValue::Counter(1))
        ));
    }
}
