use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use thingsync::Adapter;
use thingsync::Config;
use thingsync::Engine;
use thingsync::adapter::ReqwestClient;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "thingsync",
    about = "Discover SSDP-announced HTTP/JSON devices and keep their properties in sync",
    version
)]
struct Args {
    /// Path to TOML config file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pairing window in seconds [default: discovery.pairing_timeout_secs]
    #[arg(short, long, value_name = "SECS")]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.logging.filter_directives()))
        .init();

    tracing::info!("thingsync starting");
    if let Some(path) = &args.config {
        tracing::info!("Loaded config from: {}", path.display());
    }

    let engine = Arc::new(Engine::new());
    let client = ReqwestClient::new(config.http.request_timeout())
        .context("Failed to create HTTP client")?;
    let adapter = Arc::new(Adapter::new(
        &config,
        Arc::new(engine.handle()),
        Arc::new(client),
    ));

    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run().await })
    };

    #[cfg(feature = "api")]
    let api_shutdown = match &config.api {
        Some(api) => {
            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
            let state = Arc::new(thingsync::api::AppState {
                version: env!("CARGO_PKG_VERSION"),
                adapter: adapter.clone(),
                engine: engine.clone(),
            });
            let (listen, port) = (api.listen.clone(), api.port);
            let task = tokio::spawn(async move {
                if let Err(e) = thingsync::api::serve(listen, port, state, shutdown_rx).await {
                    tracing::error!("HTTP API server failed: {}", e);
                }
            });
            Some((shutdown_tx, task))
        }
        None => None,
    };

    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| adapter.pairing_timeout());
    adapter
        .start_pairing(timeout)
        .context("Failed to start pairing")?;

    tracing::info!("Press Ctrl+C to exit");

    // Wait for Ctrl+C
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received shutdown signal");
        }
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    adapter.cancel_pairing();

    #[cfg(feature = "api")]
    if let Some((shutdown_tx, task)) = api_shutdown {
        let _ = shutdown_tx.send(());
        if let Err(e) = task.await {
            tracing::warn!("HTTP API task error: {}", e);
        }
    }

    engine_task.abort();

    let state = engine.state_snapshot();
    tracing::info!("{} device(s) known at shutdown", state.devices.len());
    tracing::info!("thingsync shutdown complete");

    Ok(())
}
