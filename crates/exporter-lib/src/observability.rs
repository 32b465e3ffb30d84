//! Structured lifecycle events
//!
//! Every event carries an `event` field so log pipelines can filter on it
//! without parsing messages.

use tracing::{debug, info, warn};

/// Structured logger for exporter events
#[derive(Clone)]
pub struct StructuredLogger {
    puppetdb_url: String,
}

impl StructuredLogger {
    pub fn new(puppetdb_url: impl Into<String>) -> Self {
        Self {
            puppetdb_url: puppetdb_url.into(),
        }
    }

    pub fn log_startup(&self, version: &str, listen_address: &str, interval_secs: u64) {
        info!(
            event = "exporter_started",
            puppetdb_url = %self.puppetdb_url,
            exporter_version = %version,
            listen_address = %listen_address,
            scrape_interval_secs = interval_secs,
            "PuppetDB exporter started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            puppetdb_url = %self.puppetdb_url,
            reason = %reason,
            "PuppetDB exporter shutting down"
        );
    }

    /// One line per finished scrape cycle
    pub fn log_cycle_complete(
        &self,
        nodes: usize,
        statuses: usize,
        errors: usize,
        elapsed_ms: u128,
    ) {
        if errors > 0 {
            warn!(
                event = "scrape_cycle_complete",
                puppetdb_url = %self.puppetdb_url,
                nodes = nodes,
                statuses = statuses,
                errors = errors,
                elapsed_ms = elapsed_ms,
                "Scrape cycle finished with errors"
            );
        } else {
            info!(
                event = "scrape_cycle_complete",
                puppetdb_url = %self.puppetdb_url,
                nodes = nodes,
                statuses = statuses,
                errors = 0,
                elapsed_ms = elapsed_ms,
                "Scrape cycle finished"
            );
        }
    }

    pub fn log_endpoint_failure(&self, endpoint: &str, error_type: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "endpoint_failed",
            puppetdb_url = %self.puppetdb_url,
            endpoint = %endpoint,
            error_type = %error_type,
            error = %error,
            "PuppetDB endpoint failed, skipping for this cycle"
        );
    }

    pub fn log_available_mbeans(&self, count: usize) {
        debug!(
            event = "mbeans_listed",
            puppetdb_url = %self.puppetdb_url,
            count = count,
            "Listed available MBeans"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("http://puppetdb:8080");
        assert_eq!(logger.puppetdb_url, "http://puppetdb:8080");
    }
}
