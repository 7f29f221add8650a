//! Recording job collaborator interface.

use crate::models::{Actor, RecordingMode};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Identifies one logical recording: a room on a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    /// Backend origin URL as sent by the caller.
    pub backend: String,

    /// Room token.
    pub token: String,
}

impl JobKey {
    pub fn new(backend: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            token: token.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.backend, self.token)
    }
}

/// Everything needed to create a recording job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub backend: String,

    /// Configured id of the backend, or `other`. Used as the metrics label.
    pub backend_id: String,

    pub token: String,
    pub mode: RecordingMode,

    /// User id the finished recording belongs to.
    pub owner: String,
}

impl JobSpec {
    pub fn key(&self) -> JobKey {
        JobKey::new(self.backend.clone(), self.token.clone())
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Failed to launch recording: {0}")]
    Launch(String),

    #[error("Recording ended unexpectedly: {0}")]
    Exited(String),

    #[error("Recording was stopped before it started")]
    StoppedBeforeStart,

    #[error("Failed to stop recording: {0}")]
    Stop(String),
}

/// One capture session, owned by the registry.
///
/// `start` and `stop` are called from different tasks and may overlap:
/// `start` can keep running for the whole recording, and `stop` must be safe
/// to call while `start` is still setting things up. Dropping the job
/// releases whatever it still holds.
#[async_trait::async_trait]
pub trait RecordingJob: Send + Sync {
    /// Start recording on behalf of `actor`.
    ///
    /// May not return until the recording ends. An error means the recording
    /// could not be started or ended without being asked to.
    async fn start(&self, actor: Actor) -> Result<(), JobError>;

    /// Stop recording on behalf of `actor`, if known.
    async fn stop(&self, actor: Option<Actor>) -> Result<(), JobError>;
}

/// Creates recording jobs for accepted start requests.
pub trait JobFactory: Send + Sync {
    fn create(&self, spec: JobSpec) -> Arc<dyn RecordingJob>;
}
