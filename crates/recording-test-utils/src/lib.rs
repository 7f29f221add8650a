//! # Recording Test Utilities
//!
//! Shared test utilities for the recording server.
//!
//! This crate provides:
//! - Server test harness (`TestRecordingServer` for E2E tests)
//! - Signed webhook helpers (`WebhookSigner`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recording_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestRecordingServer::spawn().await?;
//!     let signer = WebhookSigner::new(TEST_BACKEND_URL, TEST_BACKEND_SECRET);
//!
//!     let response = signer
//!         .post(&server.room_url("abc"), &start_request("admin", "users", "admin"))
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;
pub mod webhook;

// Re-export commonly used items
pub use server_harness::*;
pub use webhook::*;
