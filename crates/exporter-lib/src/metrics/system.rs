//! System health score derived from the node status tally
//!
//! Each status bucket of the tally is classified as healthy, warning or
//! critical by name. The score is the share of nodes in healthy buckets.
//! With an empty tally nothing is published: the three series are removed
//! instead of reporting a misleading zero.

use super::{gauge_vec, NAMESPACE};
use crate::models::StatusTally;
use prometheus::{GaugeVec, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthBucket {
    Healthy,
    Warning,
    Critical,
}

/// Status names per health bucket; unlisted statuses are healthy
#[derive(Debug, Clone, PartialEq)]
pub struct HealthThresholds {
    pub warning: Vec<String>,
    pub critical: Vec<String>,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            warning: vec!["unreported".to_string()],
            critical: vec!["failed".to_string()],
        }
    }
}

impl HealthThresholds {
    pub fn classify(&self, status: &str) -> HealthBucket {
        if self.critical.iter().any(|s| s == status) {
            HealthBucket::Critical
        } else if self.warning.iter().any(|s| s == status) {
            HealthBucket::Warning
        } else {
            HealthBucket::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthSummary {
    pub total: u64,
    pub healthy: u64,
    pub warning: u64,
    pub critical: u64,
    /// `100 * healthy / total`
    pub health_score: f64,
    /// `100 * failed / total`
    pub failure_rate: f64,
    /// `failed + unreported`
    pub degraded: u64,
}

impl HealthSummary {
    /// `None` when no node was classified
    pub fn from_tally(tally: &StatusTally, thresholds: &HealthThresholds) -> Option<Self> {
        let total = tally.total();
        if total == 0 {
            return None;
        }

        let (mut healthy, mut warning, mut critical) = (0, 0, 0);
        for (status, count) in tally.iter() {
            match thresholds.classify(status) {
                HealthBucket::Healthy => healthy += count,
                HealthBucket::Warning => warning += count,
                HealthBucket::Critical => critical += count,
            }
        }

        let failed = tally.get("failed");
        Some(Self {
            total,
            healthy,
            warning,
            critical,
            health_score: 100.0 * healthy as f64 / total as f64,
            failure_rate: 100.0 * failed as f64 / total as f64,
            degraded: failed + tally.get("unreported"),
        })
    }
}

pub struct SystemMetrics {
    thresholds: HealthThresholds,
    health_score: GaugeVec,
    failure_rate: GaugeVec,
    degraded_nodes: GaugeVec,
}

impl SystemMetrics {
    pub fn new(registry: &Registry, thresholds: HealthThresholds) -> prometheus::Result<Self> {
        Ok(Self {
            thresholds,
            health_score: gauge_vec(
                registry,
                NAMESPACE,
                "system_health_score",
                "PuppetDB system health score (0-100), calculated from node status",
                &[],
            )?,
            failure_rate: gauge_vec(
                registry,
                NAMESPACE,
                "node_failure_rate",
                "Node failure rate percentage",
                &[],
            )?,
            degraded_nodes: gauge_vec(
                registry,
                NAMESPACE,
                "degraded_nodes",
                "Number of degraded nodes (failed + unreported)",
                &[],
            )?,
        })
    }

    pub fn update(&self, tally: &StatusTally) -> Option<HealthSummary> {
        let Some(summary) = HealthSummary::from_tally(tally, &self.thresholds) else {
            self.health_score.reset();
            self.failure_rate.reset();
            self.degraded_nodes.reset();
            return None;
        };

        self.health_score.with_label_values(&[]).set(summary.health_score);
        self.failure_rate.with_label_values(&[]).set(summary.failure_rate);
        self.degraded_nodes
            .with_label_values(&[])
            .set(summary.degraded as f64);
        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::{sample, series_count};

    fn tally(entries: &[(&str, usize)]) -> StatusTally {
        let mut t = StatusTally::new();
        for (status, n) in entries {
            for _ in 0..*n {
                t.record(status);
            }
        }
        t
    }

    #[test]
    fn test_default_classification() {
        let t = HealthThresholds::default();
        assert_eq!(t.classify("changed"), HealthBucket::Healthy);
        assert_eq!(t.classify("unchanged"), HealthBucket::Healthy);
        assert_eq!(t.classify("unreported"), HealthBucket::Warning);
        assert_eq!(t.classify("failed"), HealthBucket::Critical);
    }

    #[test]
    fn test_summary_values() {
        let t = tally(&[("changed", 5), ("unchanged", 3), ("failed", 1), ("unreported", 1)]);
        let s = HealthSummary::from_tally(&t, &HealthThresholds::default()).unwrap();

        assert_eq!(s.total, 10);
        assert_eq!(s.healthy, 8);
        assert_eq!(s.health_score, 80.0);
        assert_eq!(s.failure_rate, 10.0);
        assert_eq!(s.degraded, 2);
    }

    #[test]
    fn test_score_is_bounded() {
        let thresholds = HealthThresholds::default();
        for t in [
            tally(&[("failed", 4)]),
            tally(&[("changed", 1)]),
            tally(&[("unreported", 2), ("noop", 7)]),
        ] {
            let s = HealthSummary::from_tally(&t, &thresholds).unwrap();
            assert!((0.0..=100.0).contains(&s.health_score));
            assert_eq!(s.health_score, 100.0 * s.healthy as f64 / s.total as f64);
        }
    }

    #[test]
    fn test_empty_tally_publishes_nothing() {
        let registry = Registry::new();
        let metrics = SystemMetrics::new(&registry, HealthThresholds::default()).unwrap();

        assert!(metrics.update(&tally(&[("changed", 2)])).is_some());
        assert_eq!(sample(&registry, "puppetdb_system_health_score", &[]), Some(100.0));

        assert!(metrics.update(&StatusTally::new()).is_none());
        assert_eq!(series_count(&registry, "puppetdb_system_health_score"), 0);
        assert_eq!(series_count(&registry, "puppetdb_node_failure_rate"), 0);
        assert_eq!(series_count(&registry, "puppetdb_degraded_nodes"), 0);
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = HealthThresholds {
            warning: vec!["noop".into()],
            critical: vec!["failed".into(), "unreported".into()],
        };
        let t = tally(&[("noop", 1), ("unreported", 1), ("changed", 2)]);
        let s = HealthSummary::from_tally(&t, &thresholds).unwrap();
        assert_eq!(s.warning, 1);
        assert_eq!(s.critical, 1);
        assert_eq!(s.health_score, 50.0);
    }
}
