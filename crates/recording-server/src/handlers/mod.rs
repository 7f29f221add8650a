//! HTTP request handlers for the recording server.

pub mod health;
pub mod metrics;
pub mod room;
pub mod welcome;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use room::room_request;
pub use welcome::welcome;
