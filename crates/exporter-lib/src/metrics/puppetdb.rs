//! PuppetDB core series: population, storage, command queue, database
//! pools and HTTP endpoint statistics

use super::{gauge_vec, set_present, MonotonicCounter, NAMESPACE};
use crate::extract::{HistogramStats, RateStats};
use prometheus::{GaugeVec, Registry};

/// HikariCP pools exposed by PuppetDB
pub const DB_POOLS: [&str; 2] = ["PDBReadPool", "PDBWritePool"];

/// Query and command endpoints with per-endpoint timers
pub const HTTP_ENDPOINTS: [&str; 6] = [
    "/pdb/query/v4/nodes",
    "/pdb/query/v4/resources",
    "/pdb/query/v4/facts",
    "/pdb/query/v4/reports",
    "/pdb/cmd/v1",
    "/metrics/v2/read",
];

/// Global command counters, by `outcome` label
pub const COMMAND_TOTALS: [&str; 4] = ["seen", "processed", "fatal", "retried"];

/// Readings for one database pool
#[derive(Debug, Clone, Default)]
pub struct DbPoolReadings {
    pub active: Option<f64>,
    pub idle: Option<f64>,
    pub total: Option<f64>,
    pub pending: Option<f64>,
    pub max_connections: Option<f64>,
    pub min_connections: Option<f64>,
    pub usage: HistogramStats,
    /// Already converted to seconds
    pub wait: HistogramStats,
    /// Milliseconds
    pub creation: HistogramStats,
    pub timeouts: RateStats,
}

/// `<prefix>_<stat><suffix>` gauges for mean, p75, p95, p99 and max
struct StatGauges {
    mean: GaugeVec,
    p75: GaugeVec,
    p95: GaugeVec,
    p99: GaugeVec,
    max: GaugeVec,
}

impl StatGauges {
    fn register(registry: &Registry, prefix: &str, suffix: &str, what: &str) -> prometheus::Result<Self> {
        let gauge = |stat: &str, label: &str| {
            gauge_vec(
                registry,
                NAMESPACE,
                &format!("{prefix}_{stat}{suffix}"),
                &format!("{label} of {what}"),
                &["pool"],
            )
        };
        Ok(Self {
            mean: gauge("mean", "Mean")?,
            p75: gauge("75th_percentile", "75th percentile")?,
            p95: gauge("95th_percentile", "95th percentile")?,
            p99: gauge("99th_percentile", "99th percentile")?,
            max: gauge("max", "Maximum")?,
        })
    }

    fn set(&self, pool: &str, stats: &HistogramStats) {
        set_present(&self.mean, &[pool], stats.mean);
        set_present(&self.p75, &[pool], stats.p75);
        set_present(&self.p95, &[pool], stats.p95);
        set_present(&self.p99, &[pool], stats.p99);
        set_present(&self.max, &[pool], stats.max);
    }
}

pub struct PuppetDbMetrics {
    population_nodes: GaugeVec,
    population_resources: GaugeVec,
    population_avg_resources_per_node: GaugeVec,
    population_resource_dupes: GaugeVec,

    storage_duplicate_pct: GaugeVec,
    storage_gc_duration: GaugeVec,
    storage_replace_facts_duration: GaugeVec,
    storage_replace_catalog_duration: GaugeVec,

    command_queue_depth: GaugeVec,
    command_awaiting_retry: GaugeVec,
    commands_total: MonotonicCounter,

    db_connections_active: GaugeVec,
    db_connections_idle: GaugeVec,
    db_connections_total: GaugeVec,
    db_connections_pending: GaugeVec,
    db_pool_max_connections: GaugeVec,
    db_pool_min_connections: GaugeVec,
    db_pool_usage: StatGauges,
    db_pool_wait: StatGauges,
    db_pool_creation: StatGauges,
    db_pool_creation_count: GaugeVec,
    /// one_minute, five_minute, fifteen_minute, mean, count
    db_pool_timeout_rates: Vec<GaugeVec>,

    http_service_time_stats: GaugeVec,
    http_service_time_percentiles: GaugeVec,
    http_request_rate: GaugeVec,
}

impl PuppetDbMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let scalar = |name: &str, help: &str| gauge_vec(registry, NAMESPACE, name, help, &[]);
        let per_pool = |name: &str, help: &str| gauge_vec(registry, NAMESPACE, name, help, &["pool"]);

        let mut db_pool_timeout_rates = Vec::new();
        for rate in ["one_minute", "five_minute", "fifteen_minute", "mean", "count"] {
            db_pool_timeout_rates.push(per_pool(
                &format!("db_pool_connection_timeout_rate_{rate}"),
                &format!("Connection timeout rate ({rate})"),
            )?);
        }

        Ok(Self {
            population_nodes: scalar("population_nodes_total", "Number of active nodes")?,
            population_resources: scalar("population_resources_total", "Number of resources")?,
            population_avg_resources_per_node: scalar(
                "population_avg_resources_per_node",
                "Average number of resources per node",
            )?,
            population_resource_dupes: scalar(
                "population_resource_duplicate_percentage",
                "Percentage of resources shared between catalogs",
            )?,

            storage_duplicate_pct: scalar(
                "storage_duplicate_percentage",
                "Percentage of catalogs found to be duplicates on storage",
            )?,
            storage_gc_duration: scalar(
                "storage_gc_duration_seconds",
                "Mean duration of database garbage collection in seconds",
            )?,
            storage_replace_facts_duration: scalar(
                "storage_replace_facts_duration_seconds",
                "Mean duration of fact replacement in seconds",
            )?,
            storage_replace_catalog_duration: scalar(
                "storage_replace_catalog_duration_seconds",
                "Mean duration of catalog replacement in seconds",
            )?,

            command_queue_depth: scalar("command_queue_depth", "Number of commands waiting in the queue")?,
            command_awaiting_retry: scalar(
                "command_awaiting_retry",
                "Number of commands waiting to be retried",
            )?,
            commands_total: MonotonicCounter::register(
                registry,
                NAMESPACE,
                "commands_total",
                "Commands handled by the command processor, by outcome",
                &["outcome"],
            )?,

            db_connections_active: per_pool("db_connections_active", "Active database connections")?,
            db_connections_idle: per_pool("db_connections_idle", "Idle database connections")?,
            db_connections_total: per_pool("db_connections_total", "Total database connections")?,
            db_connections_pending: per_pool(
                "db_connections_pending",
                "Threads waiting for a database connection",
            )?,
            db_pool_max_connections: per_pool("db_pool_max_connections", "Configured maximum pool size")?,
            db_pool_min_connections: per_pool("db_pool_min_connections", "Configured minimum idle connections")?,
            db_pool_usage: StatGauges::register(registry, "db_pool_usage", "", "pool connection usage")?,
            db_pool_wait: StatGauges::register(
                registry,
                "db_pool_wait",
                "_seconds",
                "pool connection wait time in seconds",
            )?,
            db_pool_creation: StatGauges::register(
                registry,
                "db_pool_connection_creation",
                "_ms",
                "connection creation time in milliseconds",
            )?,
            db_pool_creation_count: per_pool(
                "db_pool_connection_creation_count",
                "Number of connections created",
            )?,
            db_pool_timeout_rates,

            http_service_time_stats: gauge_vec(
                registry,
                NAMESPACE,
                "http_service_time_stats_seconds",
                "HTTP endpoint service time statistics in seconds",
                &["endpoint", "stat"],
            )?,
            http_service_time_percentiles: gauge_vec(
                registry,
                NAMESPACE,
                "http_service_time_percentile_seconds",
                "HTTP endpoint service time percentiles in seconds",
                &["endpoint", "percentile"],
            )?,
            http_request_rate: gauge_vec(
                registry,
                NAMESPACE,
                "http_request_rate",
                "Rate of successful (200) requests per second",
                &["endpoint", "rate_type"],
            )?,
        })
    }

    pub fn update_population(
        &self,
        nodes: Option<f64>,
        resources: Option<f64>,
        avg_resources_per_node: Option<f64>,
        resource_dupes_pct: Option<f64>,
    ) {
        set_present(&self.population_nodes, &[], nodes);
        set_present(&self.population_resources, &[], resources);
        set_present(&self.population_avg_resources_per_node, &[], avg_resources_per_node);
        set_present(&self.population_resource_dupes, &[], resource_dupes_pct);
    }

    /// Durations in seconds
    pub fn update_storage(
        &self,
        duplicate_pct: Option<f64>,
        gc: Option<f64>,
        replace_facts: Option<f64>,
        replace_catalog: Option<f64>,
    ) {
        set_present(&self.storage_duplicate_pct, &[], duplicate_pct);
        set_present(&self.storage_gc_duration, &[], gc);
        set_present(&self.storage_replace_facts_duration, &[], replace_facts);
        set_present(&self.storage_replace_catalog_duration, &[], replace_catalog);
    }

    pub fn update_commands(&self, depth: Option<f64>, awaiting_retry: Option<f64>) {
        set_present(&self.command_queue_depth, &[], depth);
        set_present(&self.command_awaiting_retry, &[], awaiting_retry);
    }

    /// `outcome` is one of [`COMMAND_TOTALS`]
    pub fn observe_command_total(&self, outcome: &str, total: Option<f64>) {
        self.commands_total.observe_total(&[outcome], total);
    }

    pub fn update_db_pool(&self, pool: &str, readings: &DbPoolReadings) {
        let labels = [pool];
        set_present(&self.db_connections_active, &labels, readings.active);
        set_present(&self.db_connections_idle, &labels, readings.idle);
        set_present(&self.db_connections_total, &labels, readings.total);
        set_present(&self.db_connections_pending, &labels, readings.pending);
        set_present(&self.db_pool_max_connections, &labels, readings.max_connections);
        set_present(&self.db_pool_min_connections, &labels, readings.min_connections);

        self.db_pool_usage.set(pool, &readings.usage);
        self.db_pool_wait.set(pool, &readings.wait);
        self.db_pool_creation.set(pool, &readings.creation);
        set_present(&self.db_pool_creation_count, &labels, readings.creation.count);

        let t = &readings.timeouts;
        let rates = [t.one_minute, t.five_minute, t.fifteen_minute, t.mean, t.count];
        for (vec, value) in self.db_pool_timeout_rates.iter().zip(rates) {
            set_present(vec, &labels, value);
        }
    }

    /// `service_time` in seconds
    pub fn update_http_endpoint(&self, endpoint: &str, service_time: &HistogramStats, requests: &RateStats) {
        for (stat, value) in service_time.summary() {
            set_present(&self.http_service_time_stats, &[endpoint, stat], value);
        }
        for (percentile, value) in service_time.percentiles() {
            set_present(&self.http_service_time_percentiles, &[endpoint, percentile], value);
        }
        for (rate_type, value) in requests.rates() {
            set_present(&self.http_request_rate, &[endpoint, rate_type], value);
        }
    }
}
