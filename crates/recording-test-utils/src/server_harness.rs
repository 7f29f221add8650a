//! Test server harness for E2E testing
//!
//! Provides `TestRecordingServer` for spawning real recording server
//! instances in tests. Recording jobs are `MockRecordingJob`s, so no capture
//! program is ever launched.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use recording_server::config::Config;
use recording_server::jobs::{JobRegistry, MockJobFactory};
use recording_server::observability::metrics::init_metrics_recorder;
use recording_server::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// Backend URL configured in the default test configuration.
pub const TEST_BACKEND_URL: &str = "https://cloud.example.com/nextcloud";

/// Secret of `TEST_BACKEND_URL` in the default test configuration.
pub const TEST_BACKEND_SECRET: &str = "test-backend-secret-0123456789abcdef";

/// Configuration used by `TestRecordingServer::spawn`.
pub fn test_config_toml() -> String {
    format!(
        r#"
[http]
listen = "127.0.0.1:0"

[backend]
backends = ["test"]

[backends.test]
url = "{TEST_BACKEND_URL}"
secret = "{TEST_BACKEND_SECRET}"

[stats]
allowed_ips = ["127.0.0.1/32"]
"#
    )
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// The process-wide Prometheus handle.
///
/// The first server installs the global recorder; if something else already
/// installed one, a standalone recorder is used instead.
fn metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => PrometheusBuilder::new().build_recorder().handle(),
        })
        .clone()
}

/// Test harness for spawning the recording server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_welcome() -> Result<(), anyhow::Error> {
///     let server = TestRecordingServer::spawn().await?;
///
///     let response = reqwest::get(format!("{}/api/v1/welcome", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestRecordingServer {
    addr: SocketAddr,
    config: Arc<Config>,
    registry: JobRegistry,
    factory: Arc<MockJobFactory>,
    _handle: JoinHandle<()>,
}

impl TestRecordingServer {
    /// Spawn a server with `test_config_toml()` and succeeding mock jobs.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        let config = Config::from_toml_str(&test_config_toml())
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        Self::spawn_with(config, Arc::new(MockJobFactory::default())).await
    }

    /// Spawn a server with the given configuration and job factory.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0), ignoring `http.listen`
    /// - Start the HTTP server in the background
    pub async fn spawn_with(
        config: Config,
        factory: Arc<MockJobFactory>,
    ) -> Result<Self, anyhow::Error> {
        let config = Arc::new(config);
        let registry = JobRegistry::new(factory.clone());

        let state = Arc::new(AppState {
            config: config.clone(),
            registry: registry.clone(),
        });

        // Build routes using the server's real route builder
        let app = routes::build_routes(state, metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            // Connect info is required by the client address middleware
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            registry,
            factory,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// URL of the room webhook for `token`.
    pub fn room_url(&self, token: &str) -> String {
        format!("{}/api/v1/room/{}", self.url(), token)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The registry behind the server.
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// The mock factory that creates every job of this server.
    pub fn factory(&self) -> &MockJobFactory {
        &self.factory
    }
}

impl Drop for TestRecordingServer {
    fn drop(&mut self) {
        // Abort the HTTP server task so the port is released immediately.
        self._handle.abort();
    }
}
