//! Payhook webhook receiver.
//!
//! Main entry point. Loads configuration, starts the processing engine and
//! the HTTP server, and on shutdown stops admitting requests before draining
//! the engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use payhook_api::{shutdown_signal, start_server, AppState, Config, LogFormat};
use payhook_core::{Clock, NoOpEventHandler, RealClock};
use payhook_worker::{ApiProcessor, ProcessingEngine};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config)?;

    info!(config = ?config, "Starting payhook webhook receiver");
    for warning in config.warnings() {
        warn!("{warning}");
    }

    let processor = Arc::new(
        ApiProcessor::new(config.to_api_client_config())
            .context("Failed to build platform API client")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(RealClock);

    let mut engine = ProcessingEngine::with_event_handler(
        config.to_engine_config(),
        processor,
        clock.clone(),
        Arc::new(NoOpEventHandler),
    )?;
    engine.start().await?;

    let state = AppState::new(&config, &engine, clock)?;
    let addr = config.parse_server_addr()?;

    info!(addr = %addr, "payhook is ready to receive webhooks");

    // Stop admitting requests before the engine closes its queue.
    let served = start_server(state, addr, shutdown_signal()).await;

    info!("HTTP server stopped, draining processing engine");
    if let Err(e) = engine.shutdown().await {
        error!(error = %e, "Processing engine did not shut down cleanly");
    }

    served.context("HTTP server failed")?;

    info!("payhook shutdown complete");
    Ok(())
}

/// Initializes tracing from the configured filter and output format.
fn init_tracing(config: &Config) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(&config.rust_log)
        .or_else(|_| EnvFilter::try_new("info,payhook=debug,tower_http=debug"))
        .context("Invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
    }
    .context("Failed to install tracing subscriber")
}
