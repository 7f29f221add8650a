//! Talk Recording Server Library
//!
//! Control plane for call recordings. Backends send signed webhooks to start
//! and stop recording a room; the server authenticates them, keeps at most
//! one recording per (backend, room) and runs the capture program in the
//! background.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/*.rs -> handlers/*.rs -> auth/*.rs
//!                                                  \-> jobs/registry.rs -> jobs/command.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Webhook checksum verification
//! - `config` - Configuration file loading
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `jobs` - Recording jobs and the job registry
//! - `middleware` - Client address resolution, metrics access, HTTP metrics
//! - `models` - Wire types
//! - `net` - Trusted networks and forwarded address resolution
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod net;
pub mod observability;
pub mod routes;
