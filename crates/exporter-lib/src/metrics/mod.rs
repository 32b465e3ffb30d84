//! Prometheus metric domains for the exporter
//!
//! Every domain registers its series into one [`Registry`] owned by
//! [`ExporterMetrics`]. Domains with a per-cycle entity set (nodes, services)
//! expose `reset`; scalar domains overwrite in place.
//!
//! Updates are conditional: a value that is absent, negative or not finite
//! leaves the previously exported sample untouched.

mod jvm;
mod metrics_v2;
mod node;
mod performance;
mod puppetdb;
mod service;
mod system;

#[cfg(test)]
pub(crate) mod testing;

pub use jvm::{JvmMetrics, GARBAGE_COLLECTORS, MEMORY_POOLS, OS_GAUGES};
pub use metrics_v2::MetricsV2Metrics;
pub use node::{NodeMetrics, NodeSample};
pub use performance::PerformanceMetrics;
pub use puppetdb::{DbPoolReadings, PuppetDbMetrics, COMMAND_TOTALS, DB_POOLS, HTTP_ENDPOINTS};
pub use service::ServiceMetrics;
pub use system::{HealthBucket, HealthSummary, HealthThresholds, SystemMetrics};

use dashmap::DashMap;
use prometheus::proto::MetricFamily;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::{Arc, PoisonError, RwLock};

/// Namespace of most exported series
pub const NAMESPACE: &str = "puppetdb";

/// Namespace of the per-node report series
pub const REPORT_NAMESPACE: &str = "puppet";

/// Every metric domain, registered into a private registry
pub struct ExporterMetrics {
    registry: Registry,
    /// Held for writing while a domain is replaced, for reading while gathering
    snapshot: RwLock<()>,
    pub node: NodeMetrics,
    pub service: ServiceMetrics,
    pub system: SystemMetrics,
    pub metrics_v2: MetricsV2Metrics,
    pub performance: PerformanceMetrics,
    pub puppetdb: PuppetDbMetrics,
    pub jvm: JvmMetrics,
}

impl ExporterMetrics {
    /// Register all domains. `categories` selects the report-metric
    /// categories that get their own `puppet_report_<category>` family.
    pub fn new(categories: &[String]) -> prometheus::Result<Self> {
        Self::with_thresholds(categories, HealthThresholds::default())
    }

    pub fn with_thresholds(
        categories: &[String],
        thresholds: HealthThresholds,
    ) -> prometheus::Result<Self> {
        let registry = Registry::new();

        Ok(Self {
            node: NodeMetrics::new(&registry, categories)?,
            service: ServiceMetrics::new(&registry)?,
            system: SystemMetrics::new(&registry, thresholds)?,
            metrics_v2: MetricsV2Metrics::new(&registry)?,
            performance: PerformanceMetrics::new(&registry)?,
            puppetdb: PuppetDbMetrics::new(&registry)?,
            jvm: JvmMetrics::new(&registry)?,
            registry,
            snapshot: RwLock::new(()),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run `update` so that no concurrent [`gather`](Self::gather) sees it
    /// half done. Used for reset-then-repopulate updates.
    pub fn publish<R>(&self, update: impl FnOnce(&Self) -> R) -> R {
        let _guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        update(self)
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        let _guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        self.registry.gather()
    }

    /// Render the current snapshot in the text exposition format
    pub fn encode_text(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

pub(crate) fn gauge_vec(
    registry: &Registry,
    namespace: &str,
    name: &str,
    help: &str,
    labels: &[&str],
) -> prometheus::Result<GaugeVec> {
    let vec = GaugeVec::new(Opts::new(name, help).namespace(namespace), labels)?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

pub(crate) fn counter_vec(
    registry: &Registry,
    namespace: &str,
    name: &str,
    help: &str,
    labels: &[&str],
) -> prometheus::Result<CounterVec> {
    let vec = CounterVec::new(Opts::new(name, help).namespace(namespace), labels)?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

pub(crate) fn histogram_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    buckets: &[f64],
    labels: &[&str],
) -> prometheus::Result<HistogramVec> {
    let vec = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets.to_vec()), labels)?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

/// Keep only values that may be exported
pub(crate) fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

pub(crate) fn set_present(vec: &GaugeVec, labels: &[&str], value: Option<f64>) {
    if let Some(v) = present(value) {
        vec.with_label_values(labels).set(v);
    }
}

/// Counter that mirrors a remote running total
///
/// Each observation adds the increase since the previous one. A total lower
/// than the last one seen means the remote side restarted; it is added in
/// full. The exported value therefore never decreases.
#[derive(Clone)]
pub struct MonotonicCounter {
    counter: CounterVec,
    last_totals: Arc<DashMap<Vec<String>, f64>>,
}

impl MonotonicCounter {
    pub fn new(counter: CounterVec) -> Self {
        Self {
            counter,
            last_totals: Arc::new(DashMap::new()),
        }
    }

    pub(crate) fn register(
        registry: &Registry,
        namespace: &str,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> prometheus::Result<Self> {
        counter_vec(registry, namespace, name, help, labels).map(Self::new)
    }

    /// Record the latest remote total for `labels`
    pub fn observe_total(&self, labels: &[&str], total: Option<f64>) {
        let Some(total) = present(total) else {
            return;
        };

        let key: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        let delta = match self.last_totals.insert(key, total) {
            Some(previous) if total >= previous => total - previous,
            _ => total,
        };

        self.counter.with_label_values(labels).inc_by(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::testing::sample;
    use super::*;

    fn counter(registry: &Registry) -> MonotonicCounter {
        MonotonicCounter::register(registry, NAMESPACE, "test_total", "test counter", &["gc"])
            .unwrap()
    }

    #[test]
    fn test_present_filters_invalid_values() {
        assert_eq!(present(Some(1.5)), Some(1.5));
        assert_eq!(present(Some(0.0)), Some(0.0));
        assert_eq!(present(Some(-1.0)), None);
        assert_eq!(present(Some(f64::NAN)), None);
        assert_eq!(present(Some(f64::INFINITY)), None);
        assert_eq!(present(None), None);
    }

    #[test]
    fn test_monotonic_counter_advances_by_delta() {
        let registry = Registry::new();
        let c = counter(&registry);

        c.observe_total(&["young"], Some(10.0));
        assert_eq!(sample(&registry, "puppetdb_test_total", &[("gc", "young")]), Some(10.0));

        c.observe_total(&["young"], Some(15.0));
        assert_eq!(sample(&registry, "puppetdb_test_total", &[("gc", "young")]), Some(15.0));

        // same total again adds nothing
        c.observe_total(&["young"], Some(15.0));
        assert_eq!(sample(&registry, "puppetdb_test_total", &[("gc", "young")]), Some(15.0));
    }

    #[test]
    fn test_monotonic_counter_restart_adds_in_full() {
        let registry = Registry::new();
        let c = counter(&registry);

        c.observe_total(&["old"], Some(100.0));
        c.observe_total(&["old"], Some(4.0));
        assert_eq!(sample(&registry, "puppetdb_test_total", &[("gc", "old")]), Some(104.0));
    }

    #[test]
    fn test_monotonic_counter_ignores_missing_readings() {
        let registry = Registry::new();
        let c = counter(&registry);

        c.observe_total(&["old"], Some(7.0));
        c.observe_total(&["old"], None);
        c.observe_total(&["old"], Some(-3.0));
        c.observe_total(&["old"], Some(9.0));
        assert_eq!(sample(&registry, "puppetdb_test_total", &[("gc", "old")]), Some(9.0));
    }

    #[test]
    fn test_label_less_vec_absent_until_set() {
        let registry = Registry::new();
        let g = gauge_vec(&registry, NAMESPACE, "absent", "absent gauge", &[]).unwrap();
        assert!(registry.gather().iter().all(|mf| mf.get_name() != "puppetdb_absent"));

        set_present(&g, &[], Some(-1.0));
        assert_eq!(sample(&registry, "puppetdb_absent", &[]), None);

        set_present(&g, &[], Some(2.0));
        assert_eq!(sample(&registry, "puppetdb_absent", &[]), Some(2.0));
    }

    #[test]
    fn test_exporter_metrics_encode() {
        let metrics = ExporterMetrics::new(&["resources".to_string()]).unwrap();
        metrics.performance.record_scrape_duration("nodes", std::time::Duration::from_millis(5));

        let text = String::from_utf8(metrics.encode_text().unwrap()).unwrap();
        assert!(text.contains("puppetdb_exporter_scrape_duration_seconds"));
    }
}
