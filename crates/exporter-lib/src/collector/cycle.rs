//! One scrape cycle
//!
//! A cycle fetches every endpoint once, in a fixed order, and publishes what
//! it got. Each fetch stands alone: its failure is timed, counted and logged,
//! then the cycle moves on. Per-cycle state lives in a [`CycleReport`] built
//! fresh for every cycle.
//!
//! Domains that are reset every cycle are rebuilt off to the side and swapped
//! in through [`ExporterMetrics::publish`], so a scrape of `/metrics` never
//! sees a half-filled node or service set.

use super::groups::CoreGroup;
use crate::client::PuppetDbSource;
use crate::error::ExtractError;
use crate::metrics::{ExporterMetrics, HealthSummary, NodeSample};
use crate::models::{parse_timestamp, Node, ServiceInfo, StatusTally};
use crate::observability::StructuredLogger;
use chrono::{DateTime, Utc};
use std::fmt::Display;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Status bucket for nodes without a recent, complete report
pub const UNREPORTED: &str = "unreported";

/// Scrape-error `endpoint` labels for the top-level fetches
pub mod endpoints {
    pub const NODES: &str = "nodes";
    pub const SERVICES: &str = "services";
    pub const METRICS_V2: &str = "metrics_v2";
}

/// Report time of a node as far as it can be established
#[derive(Debug, Clone, PartialEq)]
pub enum ReportTime {
    Missing,
    Invalid(String),
    At(DateTime<Utc>),
}

impl ReportTime {
    pub fn of(node: &Node) -> Self {
        match node.report_timestamp() {
            None => ReportTime::Missing,
            Some(raw) => match parse_timestamp(raw) {
                Ok(at) => ReportTime::At(at),
                Err(e) => ReportTime::Invalid(e.to_string()),
            },
        }
    }

    pub fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            ReportTime::At(at) => Some(*at),
            _ => None,
        }
    }
}

/// Status bucket of a node, `None` for deactivated nodes.
///
/// Active nodes are `unreported` when their report time is unknown, when the
/// report is at least `unreported_after` old, or when the report carries no
/// status. Otherwise the reported status is the bucket.
pub fn classify_node<'a>(
    node: &'a Node,
    report: &ReportTime,
    now: DateTime<Utc>,
    unreported_after: chrono::Duration,
) -> Option<&'a str> {
    if !node.is_active() {
        return None;
    }

    let Some(at) = report.at() else {
        return Some(UNREPORTED);
    };
    if now - at >= unreported_after {
        return Some(UNREPORTED);
    }

    Some(node.latest_report_status().unwrap_or(UNREPORTED))
}

/// A fetch that failed during the cycle
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointFailure {
    pub endpoint: String,
    pub error_type: &'static str,
    pub message: String,
}

/// What one cycle saw
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub tally: StatusTally,
    /// Nodes returned by the node fetch
    pub nodes: usize,
    /// Endpoints and MBean groups fetched
    pub endpoints: usize,
    pub failures: Vec<EndpointFailure>,
    /// MBean readings that held no usable value
    pub shape_errors: usize,
    /// `None` when no node was classified
    pub health: Option<HealthSummary>,
}

impl CycleReport {
    pub fn failed(&self, endpoint: &str) -> bool {
        self.failures.iter().any(|f| f.endpoint == endpoint)
    }

    pub fn node_fetch_failed(&self) -> bool {
        self.failed(endpoints::NODES)
    }

    pub fn error_count(&self) -> usize {
        self.failures.len() + self.shape_errors
    }

    /// Every fetch of the cycle failed, so PuppetDB is likely unreachable
    pub fn all_failed(&self) -> bool {
        self.endpoints > 0 && self.failures.len() >= self.endpoints
    }
}

/// Drives one cycle against a source and publishes into `metrics`
pub struct ScrapeCycle<'a> {
    source: &'a dyn PuppetDbSource,
    metrics: &'a ExporterMetrics,
    logger: &'a StructuredLogger,
    unreported_after: chrono::Duration,
}

impl<'a> ScrapeCycle<'a> {
    pub fn new(
        source: &'a dyn PuppetDbSource,
        metrics: &'a ExporterMetrics,
        logger: &'a StructuredLogger,
        unreported_after: chrono::Duration,
    ) -> Self {
        Self {
            source,
            metrics,
            logger,
            unreported_after,
        }
    }

    pub async fn run(&self) -> CycleReport {
        self.run_at(Utc::now()).await
    }

    /// Run the cycle with `now` as the reference time for node ages
    pub async fn run_at(&self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();

        let samples = self.scrape_nodes(&mut report, now).await;
        let tally = &report.tally;
        report.health = self.metrics.publish(|metrics| {
            metrics.node.publish(&samples, tally, now);
            metrics.system.update(tally)
        });

        self.scrape_services(&mut report).await;
        self.scrape_metrics_v2(&mut report).await;

        for group in CoreGroup::ALL {
            self.scrape_core_group(&mut report, group).await;
        }

        self.metrics
            .performance
            .set_last_scrape(Utc::now().timestamp_millis() as f64 / 1000.0);
        report
    }

    /// Classify every node and gather its series; nothing is published here
    async fn scrape_nodes(
        &self,
        report: &mut CycleReport,
        now: DateTime<Utc>,
    ) -> Vec<NodeSample> {
        let start = Instant::now();
        let result = self.source.nodes().await;
        self.metrics
            .performance
            .record_scrape_duration(endpoints::NODES, start.elapsed());
        report.endpoints += 1;

        let nodes = match result {
            Ok(nodes) => nodes,
            Err(e) => {
                self.fail(report, endpoints::NODES, e.kind(), &e);
                return Vec::new();
            }
        };
        report.nodes = nodes.len();

        let mut samples = Vec::with_capacity(nodes.len());
        for node in nodes {
            let report_time = ReportTime::of(&node);
            if let ReportTime::Invalid(reason) = &report_time {
                warn!(
                    certname = %node.certname,
                    error = %reason,
                    "Failed to parse report timestamp"
                );
            }

            if let Some(bucket) = classify_node(&node, &report_time, now, self.unreported_after) {
                report.tally.record(bucket);
            }

            // Per-node series and enrichment need a known report time
            let Some(at) = report_time.at() else {
                continue;
            };

            let report_metrics = match node.latest_report_hash() {
                Some(hash) => match self.source.report_metrics(hash).await {
                    Ok(metrics) => metrics,
                    Err(e) => {
                        debug!(
                            certname = %node.certname,
                            error = %e,
                            "Skipping report metrics"
                        );
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };

            samples.push(NodeSample {
                node,
                report_time: at,
                report_metrics,
            });
        }
        samples
    }

    async fn scrape_services(&self, report: &mut CycleReport) {
        let start = Instant::now();
        let result = self.source.services().await;
        self.metrics
            .performance
            .record_scrape_duration(endpoints::SERVICES, start.elapsed());
        report.endpoints += 1;

        let infos = match result {
            Ok(services) => {
                let mut infos: Vec<ServiceInfo> = services
                    .iter()
                    .map(|(name, status)| ServiceInfo::from_status(name, status))
                    .collect();
                infos.sort_by(|a, b| a.name.cmp(&b.name));
                infos
            }
            Err(e) => {
                self.fail(report, endpoints::SERVICES, e.kind(), &e);
                Vec::new()
            }
        };

        self.metrics.publish(|metrics| {
            metrics.service.reset();
            metrics.service.update(&infos);
        });
    }

    async fn scrape_metrics_v2(&self, report: &mut CycleReport) {
        let start = Instant::now();
        let result = self.source.metrics_v2().await;
        self.metrics
            .performance
            .record_scrape_duration(endpoints::METRICS_V2, start.elapsed());
        report.endpoints += 1;

        match result {
            Ok(response) => self
                .metrics
                .publish(|metrics| metrics.metrics_v2.update(&response)),
            Err(e) => self.fail(report, endpoints::METRICS_V2, e.kind(), &e),
        }
    }

    async fn scrape_core_group(&self, report: &mut CycleReport, group: CoreGroup) {
        let start = Instant::now();
        let result = group.collect(self.source, self.metrics).await;
        self.metrics
            .performance
            .record_scrape_duration(group.endpoint(), start.elapsed());
        report.endpoints += 1;

        match result {
            Ok(errors) => self.record_shape_errors(report, group.endpoint(), &errors),
            Err(e) => self.fail(report, group.endpoint(), e.kind(), &e),
        }
    }

    fn record_shape_errors(
        &self,
        report: &mut CycleReport,
        endpoint: &str,
        errors: &[ExtractError],
    ) {
        let Some(first) = errors.first() else {
            return;
        };

        report.shape_errors += errors.len();
        self.metrics
            .performance
            .record_scrape_error(endpoint, first.kind());
        debug!(
            endpoint = %endpoint,
            count = errors.len(),
            first_error = %first,
            "Some MBean readings had no usable value"
        );
    }

    fn fail(
        &self,
        report: &mut CycleReport,
        endpoint: &str,
        error_type: &'static str,
        error: &dyn Display,
    ) {
        self.metrics
            .performance
            .record_scrape_error(endpoint, error_type);
        self.logger.log_endpoint_failure(endpoint, error_type, error);

        report.failures.push(EndpointFailure {
            endpoint: endpoint.to_string(),
            error_type,
            message: error.to_string(),
        });
    }
}
