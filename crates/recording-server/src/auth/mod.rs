//! Webhook authentication for requests sent by backends.

pub mod checksum;
pub mod webhook;

pub use checksum::{calculate_checksum, verify_checksum};
pub use webhook::{
    authenticate, BackendDirectory, BACKEND_HEADER, CHECKSUM_HEADER, RANDOM_HEADER,
};
