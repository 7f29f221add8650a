//! Mock recording jobs for tests and the test server harness.

use super::job::{JobError, JobFactory, JobSpec, RecordingJob};
use crate::models::Actor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Scripted outcomes for mock jobs.
#[derive(Debug, Clone, Copy)]
pub struct MockBehavior {
    /// `start` fails once it is allowed to finish.
    pub fail_start: bool,

    /// `stop` fails.
    pub fail_stop: bool,

    /// `start` blocks until `release_start` (or `stop`) is called.
    pub hold_start: bool,

    /// A held `start` returns `StoppedBeforeStart` as soon as `stop` is called.
    pub stop_releases_start: bool,

    /// `stop` blocks until `release_stop` is called.
    pub hold_stop: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            fail_start: false,
            fail_stop: false,
            hold_start: false,
            stop_releases_start: true,
            hold_stop: false,
        }
    }
}

impl MockBehavior {
    /// `start` returns right away, successfully.
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// `start` returns right away with an error.
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    /// `start` blocks like a real recording until released or stopped.
    pub fn held() -> Self {
        Self {
            hold_start: true,
            ..Self::default()
        }
    }
}

/// Mock recording job.
pub struct MockRecordingJob {
    spec: JobSpec,
    behavior: MockBehavior,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    start_actor: Mutex<Option<Actor>>,
    stop_actor: Mutex<Option<Actor>>,
    entered_start: CancellationToken,
    released: CancellationToken,
    stopped: CancellationToken,
    stop_released: CancellationToken,
}

impl MockRecordingJob {
    pub fn new(spec: JobSpec, behavior: MockBehavior) -> Self {
        Self {
            spec,
            behavior,
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            start_actor: Mutex::new(None),
            stop_actor: Mutex::new(None),
            entered_start: CancellationToken::new(),
            released: CancellationToken::new(),
            stopped: CancellationToken::new(),
            stop_released: CancellationToken::new(),
        }
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn start_actor(&self) -> Option<Actor> {
        self.start_actor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stop_actor(&self) -> Option<Actor> {
        self.stop_actor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Let a held `start` finish with its scripted outcome.
    pub fn release_start(&self) {
        self.released.cancel();
    }

    /// Let a held `stop` finish with its scripted outcome.
    pub fn release_stop(&self) {
        self.stop_released.cancel();
    }

    /// Wait until `start` has been entered.
    pub async fn wait_until_started(&self) {
        self.entered_start.cancelled().await;
    }

    /// Wait until `stop` has been entered.
    pub async fn wait_until_stopped(&self) {
        self.stopped.cancelled().await;
    }
}

#[async_trait::async_trait]
impl RecordingJob for MockRecordingJob {
    async fn start(&self, actor: Actor) -> Result<(), JobError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .start_actor
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(actor);
        self.entered_start.cancel();

        if self.behavior.hold_start {
            tokio::select! {
                _ = self.released.cancelled() => {}
                _ = self.stopped.cancelled(), if self.behavior.stop_releases_start => {
                    return Err(JobError::StoppedBeforeStart);
                }
            }
        }

        if self.behavior.fail_start {
            Err(JobError::Launch("mock start failure".to_string()))
        } else {
            Ok(())
        }
    }

    async fn stop(&self, actor: Option<Actor>) -> Result<(), JobError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .stop_actor
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = actor;
        self.stopped.cancel();

        if self.behavior.hold_stop {
            self.stop_released.cancelled().await;
        }

        if self.behavior.fail_stop {
            Err(JobError::Stop("mock stop failure".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Factory producing mock jobs and remembering them for inspection.
pub struct MockJobFactory {
    behavior: Mutex<MockBehavior>,
    jobs: Mutex<Vec<Arc<MockRecordingJob>>>,
}

impl MockJobFactory {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Behavior for jobs created from now on.
    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    /// All jobs created so far, oldest first.
    pub fn jobs(&self) -> Vec<Arc<MockRecordingJob>> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn created(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// The most recently created job.
    pub fn last(&self) -> Option<Arc<MockRecordingJob>> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Default for MockJobFactory {
    fn default() -> Self {
        Self::new(MockBehavior::default())
    }
}

impl JobFactory for MockJobFactory {
    fn create(&self, spec: JobSpec) -> Arc<dyn RecordingJob> {
        let behavior = *self.behavior.lock().unwrap_or_else(PoisonError::into_inner);
        let job = Arc::new(MockRecordingJob::new(spec, behavior));
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&job));
        job
    }
}
