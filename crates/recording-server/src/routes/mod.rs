//! HTTP routes for the recording server.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::jobs::JobRegistry;
use crate::middleware::{http_metrics_middleware, require_stats_access, resolve_client};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request timeout applied to every route.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Owner of all recording jobs.
    pub registry: JobRegistry,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK")
/// - `/api/v1/welcome` - Version probe, unauthenticated
/// - `/api/v1/room/:token` - Signed start/stop webhook
/// - `/metrics` - Prometheus metrics, only for `stats.allowed_ips`
/// - Client address resolution through `app.trustedproxies`
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let trusted_proxies = Arc::new(state.config.trusted_proxies.clone());
    let stats_allowed_ips = Arc::new(state.config.stats_allowed_ips.clone());

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/welcome", get(handlers::welcome))
        .route("/api/v1/room/:token", post(handlers::room_request))
        .with_state(state);

    // Metrics sub-router with its own state
    let metrics_routes = Router::new()
        .route("/", get(handlers::metrics_handler))
        .route_layer(middleware::from_fn_with_state(
            stats_allowed_ips,
            require_stats_access,
        ))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. resolve_client - ClientAddress extension (innermost)
    // 2. TimeoutLayer - Timeout the request
    // 3. TraceLayer - Log request details
    // 4. http_metrics_middleware - Record ALL responses (outermost)
    api_routes
        .nest("/metrics", metrics_routes)
        .layer(middleware::from_fn_with_state(trusted_proxies, resolve_client))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}
