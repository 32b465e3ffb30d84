//! PuppetDB exporter - Prometheus metrics for PuppetDB
//!
//! Scrapes the PuppetDB query, status and metrics APIs on a fixed interval
//! and serves the result on `/metrics`, next to `/healthz` and `/readyz`.

use anyhow::{Context, Result};
use clap::Parser;
use exporter_lib::{
    metrics::ExporterMetrics, HealthRegistry, PuppetDbClient, ScrapeLoopBuilder, StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting puppetdb-exporter");

    // Load configuration; bad durations, URLs or TLS material stop here
    let cli = config::Cli::parse();
    let config = config::ExporterConfig::load(&cli)?;
    let client_options = config.client_options()?;
    let scrape_config = config.scrape_config()?;
    info!(puppetdb_url = %config.puppetdb_url, "Exporter configured");

    let metrics = Arc::new(
        ExporterMetrics::new(&config.categories).context("Failed to register metrics")?,
    );
    let client = PuppetDbClient::new(&client_options)
        .context("Failed to create PuppetDB client")?
        .with_telemetry(metrics.performance.clone());

    let health_registry = HealthRegistry::new();
    let logger = StructuredLogger::new(config.puppetdb_url.clone());
    logger.log_startup(
        EXPORTER_VERSION,
        &config.listen_address,
        scrape_config.interval.as_secs(),
    );

    let scrape_loop = ScrapeLoopBuilder::new()
        .source(Arc::new(client))
        .metrics(metrics.clone())
        .health(health_registry.clone())
        .logger(logger.clone())
        .interval(scrape_config.interval)
        .unreported_after(scrape_config.unreported_after)
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scrape_handle = tokio::spawn(scrape_loop.run(shutdown_rx));

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(health_registry, metrics));
    let api_handle = tokio::spawn(api::serve(
        config.listen_address.clone(),
        config.metrics_path.clone(),
        app_state,
    ));

    // Wait for shutdown signal or a server failure
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            let reason = match result {
                Ok(Ok(())) => "API server stopped".to_string(),
                Ok(Err(e)) => format!("API server failed: {e:#}"),
                Err(e) => format!("API server task failed: {e}"),
            };
            error!(reason = %reason, "Stopping exporter");
            logger.log_shutdown(&reason);
        }
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = scrape_handle.await {
        error!(error = %e, "Scrape loop task failed");
    }

    info!("Shutting down");
    Ok(())
}
