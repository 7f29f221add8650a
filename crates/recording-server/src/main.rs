//! Talk Recording Server
//!
//! Receives signed start/stop webhooks from Talk backends and runs one
//! capture process per recorded room.
//!
//! # Startup Flow
//!
//! 1. Parse command line flags
//! 2. Load configuration file
//! 3. Initialize tracing from `RUST_LOG` or `logs.level`
//! 4. Initialize Prometheus metrics recorder
//! 5. Build the job registry and routes
//! 6. Serve until SIGINT/SIGTERM
//! 7. Drop running recordings and wait for background work

use clap::{ArgAction, Parser};
use recording_server::config::{Config, DEFAULT_CONFIG_PATH};
use recording_server::jobs::{CommandJobFactory, JobRegistry};
use recording_server::observability::metrics::init_metrics_recorder;
use recording_server::routes::{self, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "RECORDING_CONFIG")]
    config: PathBuf,

    /// Print version and exit
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Configuration problems are reported on stderr until the real
    // subscriber, which depends on the configured level, is installed.
    let bootstrap = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || Config::load(&cli.config))
        .map_err(|e| {
            eprintln!("Failed to load configuration: {e}");
            e
        })?;

    // Initialize tracing
    let default_filter = format!(
        "recording={level},tower_http={level}",
        level = config.log_level_filter()
    );
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Talk Recording Server");
    info!(
        config = %cli.config.display(),
        listen = %config.listen,
        trusted_proxies = config.trusted_proxies.len(),
        backends = config.backends().count(),
        allow_all = config.allow_all,
        command = %config.recording.command,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder
    // This must happen before any metrics are recorded
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let config = Arc::new(config);
    let shutdown_timeout = config.recording.shutdown_timeout;
    let listen: SocketAddr = config.listen;

    let registry = JobRegistry::new(Arc::new(CommandJobFactory::new(Arc::clone(&config))));
    let state = Arc::new(AppState {
        config,
        registry: registry.clone(),
    });

    let app = routes::build_routes(state, metrics_handle);

    let listener = tokio::net::TcpListener::bind(listen).await.map_err(|e| {
        error!(listen = %listen, error = %e, "Failed to bind listen address");
        e
    })?;

    info!("Talk Recording Server listening on {}", listen);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let dropped = registry.drain_all().await;
    if dropped > 0 {
        warn!(recordings = dropped, "Dropped running recordings at shutdown");
    }

    if !registry.wait_for_background_tasks(shutdown_timeout).await {
        warn!("Shutdown deadline reached with recording work still pending");
    }

    info!("Talk Recording Server shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
