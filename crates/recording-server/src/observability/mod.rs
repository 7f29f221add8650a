//! Observability module for the recording server.
//!
//! Provides metrics definitions and instrumentation helpers.

pub mod metrics;
