//! Exporter self-metrics: scrape timings, errors and API request stats

use super::{counter_vec, gauge_vec, histogram_vec};
use prometheus::{CounterVec, GaugeVec, HistogramVec, Registry};
use std::time::Duration;

/// Histogram buckets for remote call durations (in seconds)
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

#[derive(Clone)]
pub struct PerformanceMetrics {
    scrape_duration: HistogramVec,
    scrape_errors: CounterVec,
    request_duration: HistogramVec,
    requests_total: CounterVec,
    last_scrape: GaugeVec,
}

impl PerformanceMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            scrape_duration: histogram_vec(
                registry,
                "puppetdb_exporter_scrape_duration_seconds",
                "PuppetDB exporter scrape duration in seconds",
                DURATION_BUCKETS,
                &["endpoint"],
            )?,
            scrape_errors: counter_vec(
                registry,
                "",
                "puppetdb_exporter_scrape_errors_total",
                "Total number of scrape errors",
                &["endpoint", "error_type"],
            )?,
            request_duration: histogram_vec(
                registry,
                "puppetdb_exporter_request_duration_seconds",
                "PuppetDB API request duration in seconds",
                DURATION_BUCKETS,
                &["endpoint", "method"],
            )?,
            requests_total: counter_vec(
                registry,
                "",
                "puppetdb_exporter_requests_total",
                "Total number of PuppetDB API requests",
                &["endpoint", "status"],
            )?,
            last_scrape: gauge_vec(
                registry,
                "",
                "puppetdb_exporter_last_scrape_timestamp_seconds",
                "Completion time of the last scrape cycle (UNIX epoch)",
                &[],
            )?,
        })
    }

    pub fn record_scrape_duration(&self, endpoint: &str, elapsed: Duration) {
        self.scrape_duration
            .with_label_values(&[endpoint])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_scrape_error(&self, endpoint: &str, error_type: &str) {
        self.scrape_errors
            .with_label_values(&[endpoint, error_type])
            .inc();
    }

    /// Record one HTTP round trip against the PuppetDB API
    pub fn record_request(&self, endpoint: &str, method: &str, status: &str, elapsed: Duration) {
        self.request_duration
            .with_label_values(&[endpoint, method])
            .observe(elapsed.as_secs_f64());
        self.requests_total
            .with_label_values(&[endpoint, status])
            .inc();
    }

    pub fn set_last_scrape(&self, epoch_seconds: f64) {
        self.last_scrape.with_label_values(&[]).set(epoch_seconds);
    }
}
