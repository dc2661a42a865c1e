//! DevHub daemon entry point.
//!
//! Wires configuration, logging, and the Ctrl-C handler around the server,
//! then runs the accept loop on the Tokio runtime.
//!
//! # Exit codes
//!
//! - `0` – clean shutdown after `stop()`.
//! - `1` – configuration file present but unreadable/invalid.
//! - `2` – fatal startup failure: local address resolution or port bind
//!   failed.  The environment is unusable; retrying would not help.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use devhub_daemon::config::DaemonConfig;
use devhub_daemon::server::{DaemonServer, EXIT_STARTUP_FAILURE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional first argument: path to the TOML config file.
    let config = match std::env::args().nth(1) {
        Some(path) => DaemonConfig::load_or_default(Path::new(&path))?,
        None => DaemonConfig::default(),
    };

    // Initialise structured logging.  `RUST_LOG` overrides the config level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!(port = config.port, "DevHub daemon starting");

    let server = Arc::new(DaemonServer::new(config));

    // Ctrl-C / SIGTERM initiates the one-way stop sequence: the accept loop
    // exits and every registered device is evicted.
    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_server.stop();
        }
    });

    if let Err(e) = Arc::clone(&server).run().await {
        error!("fatal startup error: {e:#}");
        std::process::exit(EXIT_STARTUP_FAILURE);
    }

    info!("DevHub daemon stopped");
    Ok(())
}
