//! HTTP middleware for the recording server.
//!
//! # Components
//!
//! - `client_address` - Resolves the real client address behind trusted proxies
//! - `http_metrics` - HTTP request metrics
//! - `stats_access` - Restricts `/metrics` to allowed client networks

pub mod client_address;
pub mod http_metrics;
pub mod stats_access;

pub use client_address::resolve_client;
pub use http_metrics::http_metrics_middleware;
pub use stats_access::require_stats_access;
