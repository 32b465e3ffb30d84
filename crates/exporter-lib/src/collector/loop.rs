//! Scrape loop
//!
//! Runs one [`ScrapeCycle`] per tick until shutdown is broadcast. Cycles never
//! overlap: a slow cycle delays the next tick instead of queueing a burst.

use super::cycle::{CycleReport, ScrapeCycle};
use crate::client::PuppetDbSource;
use crate::health::{components, HealthRegistry};
use crate::metrics::ExporterMetrics;
use crate::observability::StructuredLogger;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Configuration for the scrape loop
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Time between cycle starts (default: 15 seconds)
    pub interval: Duration,
    /// Report age at which an active node counts as unreported (default: 2 hours)
    pub unreported_after: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            unreported_after: Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// Periodic scrape of one PuppetDB instance
pub struct ScrapeLoop {
    source: Arc<dyn PuppetDbSource>,
    metrics: Arc<ExporterMetrics>,
    config: ScrapeConfig,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl ScrapeLoop {
    pub fn new(
        source: Arc<dyn PuppetDbSource>,
        metrics: Arc<ExporterMetrics>,
        config: ScrapeConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            source,
            metrics,
            config,
            health,
            logger,
        }
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Run until `shutdown` fires. The first cycle starts immediately.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            unreported_after_secs = self.config.unreported_after.as_secs(),
            "Starting scrape loop"
        );

        self.health.register(components::SCRAPER).await;
        self.health.register(components::PUPPETDB).await;
        self.log_available_mbeans().await;

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scrape_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scrape loop");
                    break;
                }
            }
        }
    }

    /// Run a single cycle and publish its outcome to the health registry
    pub async fn scrape_once(&self) -> CycleReport {
        let start = Instant::now();
        let report = self.cycle().run().await;
        let elapsed = start.elapsed();

        self.logger.log_cycle_complete(
            report.nodes,
            report.tally.len(),
            report.error_count(),
            elapsed.as_millis(),
        );
        self.update_health(&report).await;

        report
    }

    fn cycle(&self) -> ScrapeCycle<'_> {
        ScrapeCycle::new(
            self.source.as_ref(),
            &self.metrics,
            &self.logger,
            unreported_threshold(self.config.unreported_after),
        )
    }

    async fn update_health(&self, report: &CycleReport) {
        if let Some(failure) = report
            .failures
            .iter()
            .find(|f| f.endpoint == super::cycle::endpoints::NODES)
        {
            self.health
                .set_degraded(components::SCRAPER, format!("node fetch failed: {}", failure.error_type))
                .await;
        } else {
            self.health.set_healthy(components::SCRAPER).await;
        }

        if report.failures.is_empty() {
            self.health.set_healthy(components::PUPPETDB).await;
        } else if report.all_failed() {
            let reason = report
                .failures
                .first()
                .map(|f| f.message.as_str())
                .unwrap_or_default();
            self.health
                .set_unhealthy(components::PUPPETDB, format!("unreachable: {reason}"))
                .await;
        } else {
            let failed: Vec<&str> = report.failures.iter().map(|f| f.endpoint.as_str()).collect();
            self.health
                .set_degraded(components::PUPPETDB, format!("failed endpoints: {}", failed.join(", ")))
                .await;
        }

        self.health.set_ready(true).await;
    }

    async fn log_available_mbeans(&self) {
        match self.source.list_mbeans().await {
            Ok(names) => self.logger.log_available_mbeans(names.len()),
            Err(e) => debug!(error = %e, "Failed to list available MBeans"),
        }
    }
}

/// Threshold as a chrono duration, saturating at the largest representable one
fn unreported_threshold(after: Duration) -> chrono::Duration {
    chrono::Duration::from_std(after).unwrap_or(chrono::Duration::MAX)
}

/// Builder for the scrape loop
pub struct ScrapeLoopBuilder {
    source: Option<Arc<dyn PuppetDbSource>>,
    metrics: Option<Arc<ExporterMetrics>>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    config: ScrapeConfig,
}

impl ScrapeLoopBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            metrics: None,
            health: None,
            logger: None,
            config: ScrapeConfig::default(),
        }
    }

    /// Set the PuppetDB source
    pub fn source(mut self, source: Arc<dyn PuppetDbSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the metric domains to publish into
    pub fn metrics(mut self, metrics: Arc<ExporterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Share a health registry; a private one is created otherwise
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn unreported_after(mut self, after: Duration) -> Self {
        self.config.unreported_after = after;
        self
    }

    pub fn build(self) -> Result<ScrapeLoop> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Source is required"))?;
        let metrics = self
            .metrics
            .ok_or_else(|| anyhow::anyhow!("Metrics are required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Scrape interval must be greater than zero");
        }

        Ok(ScrapeLoop::new(
            source,
            metrics,
            self.config,
            self.health.unwrap_or_default(),
            self.logger.unwrap_or_else(|| StructuredLogger::new("")),
        ))
    }
}

impl Default for ScrapeLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
