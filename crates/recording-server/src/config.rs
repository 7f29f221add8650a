//! Recording server configuration.
//!
//! Configuration is loaded from a TOML file. A missing file is not an error:
//! every value has a default, but no backend is accepted until one is
//! configured. Backend and signaling secrets are `SecretString` and are
//! redacted in Debug output.

use crate::auth::BackendDirectory;
use crate::net::TrustedNetworkSet;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "server.toml";

/// Default HTTP listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8000";

/// Default log level (numeric, 20 = info).
pub const DEFAULT_LOG_LEVEL: u8 = 20;

/// Default maximum webhook body size in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 1024;

/// Default recorded video width.
pub const DEFAULT_VIDEO_WIDTH: u32 = 1920;

/// Default recorded video height.
pub const DEFAULT_VIDEO_HEIGHT: u32 = 1080;

/// Default directory for recordings until they are uploaded.
pub const DEFAULT_DIRECTORY: &str = "/tmp";

/// Default networks allowed to read `/metrics`.
pub const DEFAULT_STATS_ALLOWED_IPS: &[&str] = &["127.0.0.1/32"];

/// Default capture program launched for each recording.
pub const DEFAULT_RECORDING_COMMAND: &str = "nextcloud-talk-recording-capture";

/// Metrics label for backends without a section of their own.
pub const OTHER_BACKEND_LABEL: &str = "other";

/// Default grace period for a capture process to exit after being asked to.
pub const DEFAULT_TERMINATE_TIMEOUT_SECONDS: u64 = 10;

/// Default time to wait for background start/stop tasks at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    logs: RawLogs,
    http: RawHttp,
    app: RawApp,
    backend: RawBackendSection,
    backends: HashMap<String, RawBackend>,
    signaling: RawSignalingSection,
    signalings: HashMap<String, RawSignaling>,
    stats: RawStats,
    recording: RawRecording,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLogs {
    level: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHttp {
    listen: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawApp {
    trustedproxies: Vec<String>,
}

/// Values that can be set globally in `[backend]` and overridden per backend.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBackendSettings {
    skipverify: Option<bool>,
    maxmessagesize: Option<u64>,
    videowidth: Option<u32>,
    videoheight: Option<u32>,
    directory: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBackendSection {
    allowall: bool,
    secret: Option<SecretString>,
    backends: Vec<String>,
    #[serde(flatten)]
    settings: RawBackendSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBackend {
    url: Option<String>,
    secret: Option<SecretString>,
    #[serde(flatten)]
    settings: RawBackendSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSignalingSection {
    internalsecret: Option<SecretString>,
    signalings: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSignaling {
    url: Option<String>,
    internalsecret: Option<SecretString>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStats {
    allowed_ips: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRecording {
    command: Option<String>,
    args: Vec<String>,
    terminate_timeout_seconds: Option<u64>,
    shutdown_timeout_seconds: Option<u64>,
}

// ---------------------------------------------------------------------------
// Validated configuration
// ---------------------------------------------------------------------------

/// Per-backend recording settings, with global defaults already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    /// Skip TLS certificate validation when talking to the backend.
    pub skip_verify: bool,

    /// Maximum accepted webhook body size in bytes.
    pub max_message_size: u64,

    pub video_width: u32,
    pub video_height: u32,

    /// Base directory for recordings until they are uploaded.
    pub directory: PathBuf,
}

impl BackendSettings {
    fn merged(overrides: &RawBackendSettings, base: &BackendSettings) -> Self {
        Self {
            skip_verify: overrides.skipverify.unwrap_or(base.skip_verify),
            max_message_size: overrides.maxmessagesize.unwrap_or(base.max_message_size),
            video_width: overrides.videowidth.unwrap_or(base.video_width),
            video_height: overrides.videoheight.unwrap_or(base.video_height),
            directory: overrides
                .directory
                .clone()
                .unwrap_or_else(|| base.directory.clone()),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            skip_verify: false,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            video_width: DEFAULT_VIDEO_WIDTH,
            video_height: DEFAULT_VIDEO_HEIGHT,
            directory: PathBuf::from(DEFAULT_DIRECTORY),
        }
    }
}

/// A configured backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Section id in the configuration file.
    pub id: String,

    /// Base URL, without trailing slash.
    pub url: String,

    pub secret: SecretString,

    pub settings: BackendSettings,
}

/// Capture command settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSettings {
    /// Program launched for each recording.
    pub command: String,

    /// Extra arguments passed to the program.
    pub args: Vec<String>,

    /// Grace period for the program to exit after being asked to stop.
    pub terminate_timeout: Duration,

    /// Time to wait for background start/stop work at shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            command: DEFAULT_RECORDING_COMMAND.to_string(),
            args: Vec::new(),
            terminate_timeout: Duration::from_secs(DEFAULT_TERMINATE_TIMEOUT_SECONDS),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECONDS),
        }
    }
}

/// Recording server configuration.
#[derive(Clone)]
pub struct Config {
    /// Numeric log level (10 debug, 20 info, 30 warning, 40 error, 50 critical).
    pub log_level: u8,

    /// HTTP listen address.
    pub listen: SocketAddr,

    /// Reverse proxies whose `X-Forwarded-For` claims are believed.
    pub trusted_proxies: TrustedNetworkSet,

    /// Accept any backend, authenticated with `allow_all_secret`.
    pub allow_all: bool,

    allow_all_secret: Option<SecretString>,

    /// Settings for backends without their own section.
    pub backend_defaults: BackendSettings,

    /// Configured backends, keyed by URL without trailing slash.
    backends: HashMap<String, BackendConfig>,

    signaling_internal_secret: Option<SecretString>,

    /// Signaling internal secrets, keyed by URL without trailing slash.
    signalings: HashMap<String, SecretString>,

    /// Clients allowed to read `/metrics`.
    pub stats_allowed_ips: TrustedNetworkSet,

    pub recording: RecordingSettings,
}

/// Custom Debug implementation that redacts secrets.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut backend_urls: Vec<&String> = self.backends.keys().collect();
        backend_urls.sort();
        let mut signaling_urls: Vec<&String> = self.signalings.keys().collect();
        signaling_urls.sort();

        f.debug_struct("Config")
            .field("log_level", &self.log_level)
            .field("listen", &self.listen)
            .field("trusted_proxies", &self.trusted_proxies.len())
            .field("allow_all", &self.allow_all)
            .field("allow_all_secret", &"[REDACTED]")
            .field("backend_defaults", &self.backend_defaults)
            .field("backends", &backend_urls)
            .field("signaling_internal_secret", &"[REDACTED]")
            .field("signalings", &signaling_urls)
            .field("stats_allowed_ips", &self.stats_allowed_ips.len())
            .field("recording", &self.recording)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL,
            listen: SocketAddr::from(([127, 0, 0, 1], 8000)),
            trusted_proxies: TrustedNetworkSet::default(),
            allow_all: false,
            allow_all_secret: None,
            backend_defaults: BackendSettings::default(),
            backends: HashMap::new(),
            signaling_internal_secret: None,
            signalings: HashMap::new(),
            stats_allowed_ips: TrustedNetworkSet::parse(DEFAULT_STATS_ALLOWED_IPS.iter()),
            recording: RecordingSettings::default(),
        }
    }
}

fn normalize_url(url: &str) -> &str {
    url.trim_end_matches('/')
}

fn non_empty(secret: Option<SecretString>) -> Option<SecretString> {
    secret.filter(|s| !s.expose_secret().is_empty())
}

impl Config {
    /// Load configuration from a file.
    ///
    /// A missing file is logged and yields the default configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(
                target: "recording.config",
                path = %path.display(),
                "Configuration file not found, using defaults"
            );
            return Self::from_toml_str("");
        }

        info!(target: "recording.config", path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&contents)
    }

    /// Load configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let log_level = raw.logs.level.unwrap_or(DEFAULT_LOG_LEVEL);

        let listen_str = raw.http.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
        let listen: SocketAddr = listen_str.parse().map_err(|e| {
            ConfigError::InvalidValue(format!(
                "http.listen must be an IP address and port, got '{}': {}",
                listen_str, e
            ))
        })?;

        let trusted_proxies = TrustedNetworkSet::parse(&raw.app.trustedproxies);

        let backend_defaults =
            BackendSettings::merged(&raw.backend.settings, &BackendSettings::default());

        let mut backends = HashMap::new();
        for id in &raw.backend.backends {
            let id = id.trim();
            let Some(section) = raw.backends.get(id) else {
                error!(target: "recording.config", backend = %id, "Missing section for backend");
                continue;
            };
            let Some(url) = section.url.as_deref() else {
                error!(target: "recording.config", backend = %id, "Missing 'url' property for backend");
                continue;
            };
            let Some(secret) = section.secret.clone() else {
                error!(target: "recording.config", backend = %id, "Missing 'secret' property for backend");
                continue;
            };

            let url = normalize_url(url).to_string();
            backends.insert(
                url.clone(),
                BackendConfig {
                    id: id.to_string(),
                    url,
                    secret,
                    settings: BackendSettings::merged(&section.settings, &backend_defaults),
                },
            );
        }

        if backends.is_empty() && !raw.backend.allowall {
            warn!(target: "recording.config", "No configured backends");
        }

        let allow_all_secret = non_empty(raw.backend.secret);
        if raw.backend.allowall && allow_all_secret.is_none() {
            warn!(
                target: "recording.config",
                "backend.allowall is set without backend.secret, all requests will be rejected"
            );
        }

        let mut signalings = HashMap::new();
        for id in &raw.signaling.signalings {
            let id = id.trim();
            let Some(section) = raw.signalings.get(id) else {
                error!(target: "recording.config", signaling = %id, "Missing section for signaling server");
                continue;
            };
            let Some(url) = section.url.as_deref() else {
                error!(target: "recording.config", signaling = %id, "Missing 'url' property for signaling server");
                continue;
            };
            let Some(secret) = non_empty(section.internalsecret.clone()) else {
                // Falls back to the global internal secret.
                continue;
            };
            signalings.insert(normalize_url(url).to_string(), secret);
        }

        let stats_allowed_ips = match &raw.stats.allowed_ips {
            Some(entries) => TrustedNetworkSet::parse(entries),
            None => TrustedNetworkSet::parse(DEFAULT_STATS_ALLOWED_IPS.iter()),
        };

        let recording_defaults = RecordingSettings::default();
        let recording = RecordingSettings {
            command: raw
                .recording
                .command
                .filter(|command| !command.trim().is_empty())
                .unwrap_or(recording_defaults.command),
            args: raw.recording.args,
            terminate_timeout: raw
                .recording
                .terminate_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(recording_defaults.terminate_timeout),
            shutdown_timeout: raw
                .recording
                .shutdown_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(recording_defaults.shutdown_timeout),
        };

        Ok(Self {
            log_level,
            listen,
            trusted_proxies,
            allow_all: raw.backend.allowall,
            allow_all_secret,
            backend_defaults,
            backends,
            signaling_internal_secret: non_empty(raw.signaling.internalsecret),
            signalings,
            stats_allowed_ips,
            recording,
        })
    }

    /// Shared secret for webhooks from the given backend.
    ///
    /// With `allowall` every backend shares the global secret.
    pub fn backend_secret(&self, backend_url: &str) -> Option<&SecretString> {
        if self.allow_all {
            return self.allow_all_secret.as_ref();
        }

        self.backends
            .get(normalize_url(backend_url))
            .map(|backend| &backend.secret)
    }

    /// Settings for the given backend, falling back to the global defaults.
    pub fn backend_settings(&self, backend_url: &str) -> &BackendSettings {
        self.backends
            .get(normalize_url(backend_url))
            .map_or(&self.backend_defaults, |backend| &backend.settings)
    }

    /// Metrics label for the given backend: its section id, or
    /// [`OTHER_BACKEND_LABEL`] for backends only accepted through `allowall`.
    pub fn backend_metrics_label(&self, backend_url: &str) -> &str {
        self.backends
            .get(normalize_url(backend_url))
            .map_or(OTHER_BACKEND_LABEL, |backend| backend.id.as_str())
    }

    /// Configured backends, in no particular order.
    pub fn backends(&self) -> impl Iterator<Item = &BackendConfig> {
        self.backends.values()
    }

    /// Internal secret of the given signaling server, falling back to the
    /// global `signaling.internalsecret`.
    pub fn signaling_internal_secret(&self, signaling_url: &str) -> Option<&SecretString> {
        self.signalings
            .get(normalize_url(signaling_url))
            .or(self.signaling_internal_secret.as_ref())
    }

    /// Log level as a tracing filter.
    pub fn log_level_filter(&self) -> LevelFilter {
        level_filter(self.log_level)
    }
}

/// Maps a numeric log level to the closest tracing level.
pub fn level_filter(level: u8) -> LevelFilter {
    match level {
        0..=9 => LevelFilter::TRACE,
        10..=19 => LevelFilter::DEBUG,
        20..=29 => LevelFilter::INFO,
        30..=39 => LevelFilter::WARN,
        _ => LevelFilter::ERROR,
    }
}

impl BackendDirectory for Config {
    fn secret(&self, backend: &str) -> Option<&SecretString> {
        self.backend_secret(backend)
    }

    fn max_message_size(&self, backend: &str) -> u64 {
        self.backend_settings(backend).max_message_size
    }
}
