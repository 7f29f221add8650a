//! Job registry: the single owner of recording lifecycle state.
//!
//! Every key is in at most one of two maps, `running` or `stopping`. Both
//! maps and the recording metrics are only changed while holding the registry
//! lock. The lock is never held across a job's `start` or `stop`; those run
//! on background tasks tracked by the registry so shutdown can wait for them.
//!
//! ```text
//! absent --try_start--> running --try_stop--> stopping --stop done--> absent
//!                          |
//!                          +--start failed / drain_all--> absent
//! ```

use super::job::{JobFactory, JobKey, JobSpec, RecordingJob};
use crate::models::Actor;
use crate::observability::metrics::{
    record_job_failure, record_recording_finished, record_recording_started,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new job was registered and its start scheduled.
    Accepted,
    /// The key is already running or stopping; nothing was done.
    AlreadyActive,
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The job moved to stopping and its stop was scheduled.
    Accepted,
    /// The job is already stopping; nothing was done.
    AlreadyStopping,
    /// No job is registered for the key.
    NotFound,
}

/// Number of jobs in each registry state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounts {
    pub running: usize,
    pub stopping: usize,
}

#[derive(Clone)]
struct JobEntry {
    job: Arc<dyn RecordingJob>,
    backend_id: String,
    /// Cancelled when the job is dropped at shutdown; ends its start task.
    abandon: CancellationToken,
}

#[derive(Default)]
struct RegistryState {
    running: HashMap<JobKey, JobEntry>,
    stopping: HashMap<JobKey, JobEntry>,
}

struct RegistryInner {
    state: Mutex<RegistryState>,
    factory: Arc<dyn JobFactory>,
    tasks: TaskTracker,
}

/// Handle to the job registry. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

impl JobRegistry {
    pub fn new(factory: Arc<dyn JobFactory>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState::default()),
                factory,
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Register and start a recording.
    ///
    /// Returns as soon as the job is registered; the job's `start` runs on a
    /// background task.
    pub async fn try_start(&self, spec: JobSpec, actor: Actor) -> StartOutcome {
        let key = spec.key();

        let entry = {
            let mut state = self.inner.state.lock().await;

            if state.running.contains_key(&key) || state.stopping.contains_key(&key) {
                warn!(
                    target: "recording.jobs",
                    backend = %key.backend,
                    token = %key.token,
                    "Trying to start recording again"
                );
                return StartOutcome::AlreadyActive;
            }

            let entry = JobEntry {
                backend_id: spec.backend_id.clone(),
                job: self.inner.factory.create(spec),
                abandon: CancellationToken::new(),
            };
            state.running.insert(key.clone(), entry.clone());
            record_recording_started(&entry.backend_id);
            entry
        };

        info!(
            target: "recording.jobs",
            backend = %key.backend,
            token = %key.token,
            "Start recording"
        );

        let registry = self.clone();
        self.inner
            .tasks
            .spawn(async move { registry.run_start(key, entry, actor).await });

        StartOutcome::Accepted
    }

    async fn run_start(&self, key: JobKey, entry: JobEntry, actor: Actor) {
        let result = tokio::select! {
            result = entry.job.start(actor) => result,
            _ = entry.abandon.cancelled() => {
                info!(
                    target: "recording.jobs",
                    backend = %key.backend,
                    token = %key.token,
                    "Recording abandoned at shutdown"
                );
                return;
            }
        };

        let error = match result {
            Ok(()) => {
                debug!(
                    target: "recording.jobs",
                    backend = %key.backend,
                    token = %key.token,
                    "Recording start returned"
                );
                return;
            }
            Err(e) => e,
        };

        let mut state = self.inner.state.lock().await;

        let still_running = state
            .running
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(&current.job, &entry.job));

        if !still_running {
            // Stopping tears the job down, which makes an unfinished start fail.
            info!(
                target: "recording.jobs",
                backend = %key.backend,
                token = %key.token,
                error = %error,
                "Recording stopped before starting"
            );
            return;
        }

        state.running.remove(&key);
        record_recording_finished(&entry.backend_id);
        record_job_failure("start");

        error!(
            target: "recording.jobs",
            backend = %key.backend,
            token = %key.token,
            error = %error,
            "Failed to start recording"
        );
    }

    /// Stop a running recording.
    ///
    /// Returns as soon as the job is moved to stopping; the job's `stop` runs
    /// on a background task.
    pub async fn try_stop(&self, key: &JobKey, actor: Option<Actor>) -> StopOutcome {
        let entry = {
            let mut state = self.inner.state.lock().await;

            match state.running.remove(key) {
                Some(entry) => {
                    state.stopping.insert(key.clone(), entry.clone());
                    entry
                }
                None if state.stopping.contains_key(key) => {
                    info!(
                        target: "recording.jobs",
                        backend = %key.backend,
                        token = %key.token,
                        "Trying to stop recording again"
                    );
                    return StopOutcome::AlreadyStopping;
                }
                None => {
                    warn!(
                        target: "recording.jobs",
                        backend = %key.backend,
                        token = %key.token,
                        "Trying to stop unknown recording"
                    );
                    return StopOutcome::NotFound;
                }
            }
        };

        info!(
            target: "recording.jobs",
            backend = %key.backend,
            token = %key.token,
            "Stop recording"
        );

        let registry = self.clone();
        let key = key.clone();
        self.inner
            .tasks
            .spawn(async move { registry.run_stop(key, entry, actor).await });

        StopOutcome::Accepted
    }

    async fn run_stop(&self, key: JobKey, entry: JobEntry, actor: Option<Actor>) {
        if let Err(e) = entry.job.stop(actor).await {
            record_job_failure("stop");
            error!(
                target: "recording.jobs",
                backend = %key.backend,
                token = %key.token,
                error = %e,
                "Failed to stop recording"
            );
        }

        let mut state = self.inner.state.lock().await;

        if state.stopping.remove(&key).is_some() {
            record_recording_finished(&entry.backend_id);
            debug!(
                target: "recording.jobs",
                backend = %key.backend,
                token = %key.token,
                "Recording stopped"
            );
        } else {
            error!(
                target: "recording.jobs",
                backend = %key.backend,
                token = %key.token,
                "Recording stopped when not in the list of stopping recordings"
            );
        }
    }

    /// Drop every job that is still running. Called once at shutdown.
    ///
    /// Jobs already stopping are left to finish on their own.
    ///
    /// # Returns
    ///
    /// The number of jobs dropped.
    pub async fn drain_all(&self) -> usize {
        let mut state = self.inner.state.lock().await;

        let drained: Vec<(JobKey, JobEntry)> = state.running.drain().collect();
        for (key, entry) in &drained {
            entry.abandon.cancel();
            record_recording_finished(&entry.backend_id);
            info!(
                target: "recording.jobs",
                backend = %key.backend,
                token = %key.token,
                "Dropping recording at shutdown"
            );
        }

        drained.len()
    }

    /// Wait for background start and stop tasks, at most `timeout`.
    ///
    /// # Returns
    ///
    /// `true` if every task finished, `false` if some were abandoned.
    pub async fn wait_for_background_tasks(&self, timeout: Duration) -> bool {
        self.inner.tasks.close();

        match tokio::time::timeout(timeout, self.inner.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    target: "recording.jobs",
                    remaining = self.inner.tasks.len(),
                    timeout_seconds = timeout.as_secs(),
                    "Abandoning background recording tasks"
                );
                false
            }
        }
    }

    pub async fn is_running(&self, key: &JobKey) -> bool {
        self.inner.state.lock().await.running.contains_key(key)
    }

    pub async fn is_stopping(&self, key: &JobKey) -> bool {
        self.inner.state.lock().await.stopping.contains_key(key)
    }

    pub async fn counts(&self) -> RegistryCounts {
        let state = self.inner.state.lock().await;
        RegistryCounts {
            running: state.running.len(),
            stopping: state.stopping.len(),
        }
    }

    /// Number of background tasks that have not finished yet.
    pub fn background_tasks(&self) -> usize {
        self.inner.tasks.len()
    }
}
