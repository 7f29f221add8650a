//! Recording jobs backed by an external capture program.
//!
//! The program gets the recording context in `TALK_RECORDING_*` environment
//! variables and runs for as long as the recording lasts. It is asked to
//! finish with SIGTERM and a closed standard input, and killed if it does not
//! exit within the termination grace period. Its output is forwarded to the
//! log line by line, whatever the encoding.

use super::job::{JobError, JobFactory, JobKey, JobSpec, RecordingJob};
use crate::config::{BackendSettings, Config, RecordingSettings};
use crate::models::Actor;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Extra time `stop` waits on top of the termination grace period.
const STOP_WAIT_MARGIN: Duration = Duration::from_secs(5);

/// Creates `CommandRecordingJob`s from the server configuration.
pub struct CommandJobFactory {
    config: Arc<Config>,
}

impl CommandJobFactory {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl JobFactory for CommandJobFactory {
    fn create(&self, spec: JobSpec) -> Arc<dyn RecordingJob> {
        let backend = self.config.backend_settings(&spec.backend).clone();
        Arc::new(CommandRecordingJob::new(
            spec,
            self.config.recording.clone(),
            backend,
        ))
    }
}

/// A recording captured by one run of the capture program.
pub struct CommandRecordingJob {
    spec: JobSpec,
    recording: RecordingSettings,
    backend: BackendSettings,
    launched: AtomicBool,
    stop_requested: CancellationToken,
    finished: CancellationToken,
}

impl CommandRecordingJob {
    pub fn new(spec: JobSpec, recording: RecordingSettings, backend: BackendSettings) -> Self {
        Self {
            spec,
            recording,
            backend,
            launched: AtomicBool::new(false),
            stop_requested: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    fn key(&self) -> JobKey {
        self.spec.key()
    }

    /// `<directory>/<alphanumeric backend>/<token>`
    pub fn output_directory(&self) -> Result<PathBuf, JobError> {
        recording_directory(&self.backend.directory, &self.spec)
    }

    fn environment(&self, actor: &Actor, directory: &Path) -> Vec<(&'static str, String)> {
        let output = directory.join(format!(
            "recording-{}",
            Local::now().format("%Y%m%d-%H%M%S")
        ));

        vec![
            ("TALK_RECORDING_BACKEND", self.spec.backend.clone()),
            ("TALK_RECORDING_TOKEN", self.spec.token.clone()),
            ("TALK_RECORDING_STATUS", self.spec.mode.status().to_string()),
            ("TALK_RECORDING_OWNER", self.spec.owner.clone()),
            ("TALK_RECORDING_ACTOR_TYPE", actor.actor_type.clone()),
            ("TALK_RECORDING_ACTOR_ID", actor.id.clone()),
            (
                "TALK_RECORDING_DIRECTORY",
                directory.to_string_lossy().into_owned(),
            ),
            ("TALK_RECORDING_OUTPUT", output.to_string_lossy().into_owned()),
            (
                "TALK_RECORDING_VIDEO_WIDTH",
                self.backend.video_width.to_string(),
            ),
            (
                "TALK_RECORDING_VIDEO_HEIGHT",
                self.backend.video_height.to_string(),
            ),
            (
                "TALK_RECORDING_SKIP_VERIFY",
                self.backend.skip_verify.to_string(),
            ),
        ]
    }

    async fn launch(&self, actor: &Actor) -> Result<Child, JobError> {
        let directory = self.output_directory()?;

        tokio::fs::create_dir_all(&directory).await.map_err(|e| {
            JobError::Launch(format!(
                "failed to create {}: {}",
                directory.display(),
                e
            ))
        })?;

        let mut command = Command::new(&self.recording.command);
        command
            .args(&self.recording.args)
            .envs(self.environment(actor, &directory))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command.spawn().map_err(|e| {
            JobError::Launch(format!("failed to run {}: {}", self.recording.command, e))
        })
    }

    /// Ask the program to finish, killing it after the grace period.
    async fn terminate(&self, mut child: Child, stdin: Option<ChildStdin>) -> Result<(), JobError> {
        let key = self.key();
        debug!(
            target: "recording.jobs",
            backend = %key.backend,
            token = %key.token,
            "Stopping recorder"
        );

        drop(stdin);
        request_exit(&key, &child);

        match tokio::time::timeout(self.recording.terminate_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                log_exit(&key, status);
                Ok(())
            }
            Ok(Err(e)) => Err(JobError::Stop(format!("failed to wait for recorder: {}", e))),
            Err(_) => {
                warn!(
                    target: "recording.jobs",
                    backend = %key.backend,
                    token = %key.token,
                    timeout_seconds = self.recording.terminate_timeout.as_secs(),
                    "Recorder did not exit in time, killing it"
                );
                child
                    .kill()
                    .await
                    .map_err(|e| JobError::Stop(format!("failed to kill recorder: {}", e)))
            }
        }
    }
}

#[async_trait::async_trait]
impl RecordingJob for CommandRecordingJob {
    async fn start(&self, actor: Actor) -> Result<(), JobError> {
        let _finished = self.finished.clone().drop_guard();

        self.launched.store(true, Ordering::SeqCst);
        if self.stop_requested.is_cancelled() {
            return Err(JobError::StoppedBeforeStart);
        }

        let key = self.key();
        let mut child = self.launch(&actor).await?;

        info!(
            target: "recording.jobs",
            backend = %key.backend,
            token = %key.token,
            pid = child.id(),
            mode = self.spec.mode.as_str(),
            "Recorder started"
        );

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(key.clone(), "stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(key.clone(), "stderr", stderr));
        }
        let stdin = child.stdin.take();

        let status = tokio::select! {
            status = child.wait() => status,
            _ = self.stop_requested.cancelled() => {
                return self.terminate(child, stdin).await;
            }
        };

        let status =
            status.map_err(|e| JobError::Exited(format!("failed to wait for recorder: {}", e)))?;

        if self.stop_requested.is_cancelled() {
            log_exit(&key, status);
            return Ok(());
        }

        Err(JobError::Exited(format!("recorder exited with {}", status)))
    }

    async fn stop(&self, actor: Option<Actor>) -> Result<(), JobError> {
        let key = self.key();
        info!(
            target: "recording.jobs",
            backend = %key.backend,
            token = %key.token,
            actor_type = actor.as_ref().map(|a| a.actor_type.as_str()),
            actor_id = actor.as_ref().map(|a| a.id.as_str()),
            "Stopping recording"
        );

        self.stop_requested.cancel();

        if !self.launched.load(Ordering::SeqCst) {
            info!(
                target: "recording.jobs",
                backend = %key.backend,
                token = %key.token,
                "Recording stopping before starting"
            );
            return Ok(());
        }

        let wait = self.recording.terminate_timeout + STOP_WAIT_MARGIN;
        tokio::time::timeout(wait, self.finished.cancelled())
            .await
            .map_err(|_| JobError::Stop("recorder did not exit in time".to_string()))
    }
}

/// Send SIGTERM so the program can finalize its output.
#[cfg(unix)]
fn request_exit(key: &JobKey, child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // Already reaped.
    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };

    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        warn!(
            target: "recording.jobs",
            backend = %key.backend,
            token = %key.token,
            pid = pid,
            error = %e,
            "Failed to send SIGTERM to recorder"
        );
    }
}

#[cfg(not(unix))]
fn request_exit(_key: &JobKey, _child: &Child) {}

fn log_exit(key: &JobKey, status: ExitStatus) {
    info!(
        target: "recording.jobs",
        backend = %key.backend,
        token = %key.token,
        status = %status,
        "Recorder exited"
    );
}

/// Directory for the recordings of a room.
///
/// The backend is reduced to its alphanumeric characters; the token must be a
/// single path component.
pub fn recording_directory(base: &Path, spec: &JobSpec) -> Result<PathBuf, JobError> {
    let token = spec.token.as_str();
    if token.is_empty() || token == "." || token == ".." || token.contains(['/', '\\']) {
        return Err(JobError::Launch(format!("invalid room token: {:?}", token)));
    }

    let backend: String = spec
        .backend
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();

    Ok(base.join(backend).join(token))
}

/// Log every line the program writes until the pipe closes.
///
/// Lines that are not UTF-8 are logged lossily; the pipe is drained either
/// way so the program never writes into a closed pipe.
async fn forward_output<R>(key: JobKey, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                info!(
                    target: "recording.recorder",
                    backend = %key.backend,
                    token = %key.token,
                    stream = stream,
                    "{}",
                    text.trim_end_matches(['\n', '\r'])
                );
            }
            Err(e) => {
                debug!(
                    target: "recording.recorder",
                    backend = %key.backend,
                    token = %key.token,
                    stream = stream,
                    error = %e,
                    "Stopped reading recorder output"
                );
                break;
            }
        }
    }
}
