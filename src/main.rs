//! Area RandR property server
//!
//! Serves the RandR output property requests over a Unix socket, with
//! outputs and their initial properties taken from the configuration file.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use area_randr::config::Config;
use area_randr::display::DisplayState;
use area_randr::server::{self, PropertyServer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "area_randr=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Area RandR property server");

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let config_arg = args
        .iter()
        .position(|arg| arg == "--config" || arg == "-c")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let config = match config_arg {
        Some(path) => Config::load_from(&path)?,
        None => Config::load().context("Failed to load configuration")?,
    };

    let display = DisplayState::from_config(&config).context("Failed to set up outputs")?;
    let path = config
        .server
        .socket_path
        .clone()
        .unwrap_or_else(server::socket_path);
    let server = PropertyServer::bind(display, &path, &config.server)?;

    // Setup signal handlers for graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Handle SIGTERM and SIGINT
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    let _ = tx.send(()).await;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    let _ = tx.send(()).await;
                }
            }
        });
    }

    server
        .serve_until(async move {
            shutdown_rx.recv().await;
        })
        .await
}
