//! Recording jobs and their lifecycle.
//!
//! - `job` - The `RecordingJob` collaborator interface and job identity
//! - `registry` - Running/stopping bookkeeping and background start/stop
//! - `command` - Jobs backed by an external capture program
//! - `mock` - Scriptable jobs for tests

pub mod command;
pub mod job;
pub mod mock;
pub mod registry;

pub use command::{CommandJobFactory, CommandRecordingJob};
pub use job::{JobError, JobFactory, JobKey, JobSpec, RecordingJob};
pub use mock::{MockBehavior, MockJobFactory, MockRecordingJob};
pub use registry::{JobRegistry, RegistryCounts, StartOutcome, StopOutcome};
