//! PuppetDB core and JVM metrics read from JMX beans
//!
//! Beans are grouped by the slice of metrics they feed. Each group is one
//! unit of failure: a failed request drops that group for the cycle and
//! nothing else. Within a group a bean the server could not read, or whose
//! reading has no usable number, drops only the series it feeds.

use crate::client::PuppetDbSource;
use crate::error::{ClientError, ExtractError};
use crate::extract::{
    extract_value, field_value, path_value, remote_error, HistogramStats,
    MBeanReading, RateStats,
};
use crate::metrics::{
    DbPoolReadings, ExporterMetrics, COMMAND_TOTALS, DB_POOLS, GARBAGE_COLLECTORS,
    HTTP_ENDPOINTS, MEMORY_POOLS, OS_GAUGES,
};
use std::collections::HashMap;

/// MBean names
pub mod beans {
    pub const NUM_NODES: &str = "puppetlabs.puppetdb.population:name=num-nodes";
    pub const NUM_RESOURCES: &str = "puppetlabs.puppetdb.population:name=num-resources";
    pub const AVG_RESOURCES_PER_NODE: &str =
        "puppetlabs.puppetdb.population:name=avg-resources-per-node";
    pub const PCT_RESOURCE_DUPES: &str = "puppetlabs.puppetdb.population:name=pct-resource-dupes";

    pub const STORAGE_DUPLICATE_PCT: &str = "puppetlabs.puppetdb.storage:name=duplicate-pct";
    pub const STORAGE_GC_TIME: &str = "puppetlabs.puppetdb.storage:name=gc-time";
    pub const STORAGE_REPLACE_FACTS_TIME: &str =
        "puppetlabs.puppetdb.storage:name=replace-facts-time";
    pub const STORAGE_REPLACE_CATALOG_TIME: &str =
        "puppetlabs.puppetdb.storage:name=replace-catalog-time";

    pub const MEMORY: &str = "java.lang:type=Memory";
    pub const THREADING: &str = "java.lang:type=Threading";
    pub const CLASS_LOADING: &str = "java.lang:type=ClassLoading";
    pub const COMPILATION: &str = "java.lang:type=Compilation";
    pub const OPERATING_SYSTEM: &str = "java.lang:type=OperatingSystem";
    pub const RUNTIME: &str = "java.lang:type=Runtime";

    /// Global command queue counter, e.g. `depth` or `seen`
    pub fn command(metric: &str) -> String {
        format!("puppetlabs.puppetdb.mq:name=global.{metric}")
    }

    pub fn db_pool(pool: &str, metric: &str) -> String {
        format!("puppetlabs.puppetdb.database:name={pool}.pool.{metric}")
    }

    pub fn http_service_time(endpoint: &str) -> String {
        format!("puppetlabs.puppetdb.http:name={endpoint}.service-time")
    }

    pub fn http_ok_rate(endpoint: &str) -> String {
        format!("puppetlabs.puppetdb.http:name={endpoint}.200")
    }

    pub fn memory_pool(pool: &str) -> String {
        format!("java.lang:type=MemoryPool,name={pool}")
    }

    pub fn garbage_collector(gc: &str) -> String {
        format!("java.lang:type=GarbageCollector,name={gc}")
    }
}

/// Per-pool connection beans, by reading field
const DB_POOL_GAUGES: [&str; 6] = [
    "ActiveConnections",
    "IdleConnections",
    "TotalConnections",
    "PendingConnections",
    "MaxConnections",
    "MinConnections",
];

/// Per-pool statistic beans
const DB_POOL_STATS: [&str; 4] = ["Usage", "Wait", "ConnectionCreation", "ConnectionTimeoutRate"];

/// Command queue gauges, as opposed to the running totals
const COMMAND_GAUGES: [&str; 2] = ["depth", "awaiting-retry"];

const MS_PER_SECOND: f64 = 1_000.0;
const NS_PER_SECOND: f64 = 1_000_000_000.0;

/// A slice of core metrics fetched together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreGroup {
    Population,
    Storage,
    Commands,
    DbPools,
    HttpEndpoints,
    /// Heap/non-heap memory and live threads, read bean by bean
    JvmBasic,
    /// Memory pools, collectors, class loading, compilation, OS, runtime, threading
    JvmDetail,
}

impl CoreGroup {
    pub const ALL: [CoreGroup; 7] = [
        CoreGroup::Population,
        CoreGroup::Storage,
        CoreGroup::Commands,
        CoreGroup::DbPools,
        CoreGroup::HttpEndpoints,
        CoreGroup::JvmBasic,
        CoreGroup::JvmDetail,
    ];

    /// `endpoint` label for scrape timings and errors
    pub fn endpoint(self) -> &'static str {
        match self {
            CoreGroup::Population => "population",
            CoreGroup::Storage => "storage",
            CoreGroup::Commands => "commands",
            CoreGroup::DbPools => "db_pools",
            CoreGroup::HttpEndpoints => "http_endpoints",
            CoreGroup::JvmBasic => "jvm",
            CoreGroup::JvmDetail => "jvm_detail",
        }
    }

    /// Beans read by this group, in request order
    pub fn mbeans(self) -> Vec<String> {
        match self {
            CoreGroup::Population => to_owned(&[
                beans::NUM_NODES,
                beans::NUM_RESOURCES,
                beans::AVG_RESOURCES_PER_NODE,
                beans::PCT_RESOURCE_DUPES,
            ]),
            CoreGroup::Storage => to_owned(&[
                beans::STORAGE_DUPLICATE_PCT,
                beans::STORAGE_GC_TIME,
                beans::STORAGE_REPLACE_FACTS_TIME,
                beans::STORAGE_REPLACE_CATALOG_TIME,
            ]),
            CoreGroup::Commands => COMMAND_GAUGES
                .into_iter()
                .chain(COMMAND_TOTALS)
                .map(beans::command)
                .collect(),
            CoreGroup::DbPools => DB_POOLS
                .into_iter()
                .flat_map(|pool| {
                    DB_POOL_GAUGES
                        .into_iter()
                        .chain(DB_POOL_STATS)
                        .map(move |metric| beans::db_pool(pool, metric))
                })
                .collect(),
            CoreGroup::HttpEndpoints => HTTP_ENDPOINTS
                .into_iter()
                .flat_map(|ep| [beans::http_service_time(ep), beans::http_ok_rate(ep)])
                .collect(),
            CoreGroup::JvmBasic => to_owned(&[beans::MEMORY, beans::THREADING]),
            CoreGroup::JvmDetail => {
                let mut names: Vec<String> =
                    MEMORY_POOLS.iter().map(|(bean, _)| beans::memory_pool(bean)).collect();
                names.extend(GARBAGE_COLLECTORS.iter().map(|(bean, _)| beans::garbage_collector(bean)));
                names.extend(to_owned(&[
                    beans::CLASS_LOADING,
                    beans::COMPILATION,
                    beans::OPERATING_SYSTEM,
                    beans::RUNTIME,
                    beans::THREADING,
                ]));
                names
            }
        }
    }

    /// Fetch this group and publish what could be read.
    ///
    /// Returns the per-bean extraction failures; `Err` only when the request
    /// itself failed.
    pub async fn collect(
        self,
        source: &dyn PuppetDbSource,
        metrics: &ExporterMetrics,
    ) -> Result<Vec<ExtractError>, ClientError> {
        let names = self.mbeans();
        let readings = match self {
            CoreGroup::JvmBasic => {
                let mut readings = Vec::with_capacity(names.len());
                for name in &names {
                    readings.push(source.read_mbean(name).await?);
                }
                readings
            }
            _ => source.read_mbeans_bulk(&names).await?,
        };

        let readings = BeanReadings::zip(&names, readings);
        let mut errors = Vec::new();
        self.publish(&readings, metrics, &mut errors);
        Ok(errors)
    }

    fn publish(self, readings: &BeanReadings, metrics: &ExporterMetrics, errors: &mut Vec<ExtractError>) {
        match self {
            CoreGroup::Population => publish_population(readings, metrics, errors),
            CoreGroup::Storage => publish_storage(readings, metrics, errors),
            CoreGroup::Commands => publish_commands(readings, metrics, errors),
            CoreGroup::DbPools => publish_db_pools(readings, metrics, errors),
            CoreGroup::HttpEndpoints => publish_http(readings, metrics, errors),
            CoreGroup::JvmBasic => publish_jvm_basic(readings, metrics, errors),
            CoreGroup::JvmDetail => publish_jvm_detail(readings, metrics, errors),
        }
    }
}

/// Readings of one request, addressed by bean name
pub struct BeanReadings {
    by_name: HashMap<String, MBeanReading>,
}

impl BeanReadings {
    /// Pair positionally aligned names and readings
    pub fn zip(names: &[String], readings: Vec<MBeanReading>) -> Self {
        Self {
            by_name: names.iter().cloned().zip(readings).collect(),
        }
    }

    /// The reading for `mbean`, or why there is none
    pub fn get(&self, mbean: &str) -> Result<&MBeanReading, ExtractError> {
        let reading = self
            .by_name
            .get(mbean)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ExtractError::UnrecognizedShape(mbean.to_string()))?;

        match remote_error(reading, mbean) {
            Some(err) => Err(err),
            None => Ok(reading),
        }
    }

    /// Single value of `mbean`
    fn value(&self, mbean: &str, errors: &mut Vec<ExtractError>) -> Option<f64> {
        keep(self.get(mbean).and_then(|r| extract_value(r, mbean)), errors)
    }

    /// One named field of `mbean`
    fn field(&self, mbean: &str, field: &str, errors: &mut Vec<ExtractError>) -> Option<f64> {
        keep(self.get(mbean).and_then(|r| field_value(r, field)), errors)
    }

    /// Reading of `mbean`, recording why it is unusable
    fn reading(&self, mbean: &str, errors: &mut Vec<ExtractError>) -> Option<&MBeanReading> {
        keep(self.get(mbean), errors)
    }

    /// Timer or histogram fields of `mbean`; all absent when unreadable
    fn histogram(&self, mbean: &str, errors: &mut Vec<ExtractError>) -> HistogramStats {
        self.reading(mbean, errors)
            .map(HistogramStats::from_reading)
            .unwrap_or_default()
    }

    /// Meter fields of `mbean`; all absent when unreadable
    fn rates(&self, mbean: &str, errors: &mut Vec<ExtractError>) -> RateStats {
        self.reading(mbean, errors)
            .map(RateStats::from_reading)
            .unwrap_or_default()
    }
}

fn keep<T>(result: Result<T, ExtractError>, errors: &mut Vec<ExtractError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

fn to_owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn seconds(value: Option<f64>, per_second: f64) -> Option<f64> {
    value.map(|v| v / per_second)
}

fn publish_population(readings: &BeanReadings, metrics: &ExporterMetrics, errors: &mut Vec<ExtractError>) {
    metrics.puppetdb.update_population(
        readings.value(beans::NUM_NODES, errors),
        readings.value(beans::NUM_RESOURCES, errors),
        readings.value(beans::AVG_RESOURCES_PER_NODE, errors),
        readings.value(beans::PCT_RESOURCE_DUPES, errors),
    );
}

fn publish_storage(readings: &BeanReadings, metrics: &ExporterMetrics, errors: &mut Vec<ExtractError>) {
    let duplicate_pct = readings.value(beans::STORAGE_DUPLICATE_PCT, errors);

    // Timers report milliseconds
    let mut timer = |bean: &str| seconds(readings.field(bean, "Mean", errors), MS_PER_SECOND);
    let gc = timer(beans::STORAGE_GC_TIME);
    let replace_facts = timer(beans::STORAGE_REPLACE_FACTS_TIME);
    let replace_catalog = timer(beans::STORAGE_REPLACE_CATALOG_TIME);

    metrics
        .puppetdb
        .update_storage(duplicate_pct, gc, replace_facts, replace_catalog);
}

fn publish_commands(readings: &BeanReadings, metrics: &ExporterMetrics, errors: &mut Vec<ExtractError>) {
    let depth = readings.field(&beans::command("depth"), "Count", errors);
    let awaiting_retry = readings.field(&beans::command("awaiting-retry"), "Count", errors);
    metrics.puppetdb.update_commands(depth, awaiting_retry);

    for outcome in COMMAND_TOTALS {
        let total = readings.field(&beans::command(outcome), "Count", errors);
        metrics.puppetdb.observe_command_total(outcome, total);
    }
}

fn publish_db_pools(readings: &BeanReadings, metrics: &ExporterMetrics, errors: &mut Vec<ExtractError>) {
    for pool in DB_POOLS {
        let bean = |metric: &str| beans::db_pool(pool, metric);

        let pool_readings = DbPoolReadings {
            active: readings.value(&bean("ActiveConnections"), errors),
            idle: readings.value(&bean("IdleConnections"), errors),
            total: readings.value(&bean("TotalConnections"), errors),
            pending: readings.value(&bean("PendingConnections"), errors),
            max_connections: readings.value(&bean("MaxConnections"), errors),
            min_connections: readings.value(&bean("MinConnections"), errors),
            usage: readings.histogram(&bean("Usage"), errors),
            wait: readings.histogram(&bean("Wait"), errors).scaled(MS_PER_SECOND),
            creation: readings.histogram(&bean("ConnectionCreation"), errors),
            timeouts: readings.rates(&bean("ConnectionTimeoutRate"), errors),
        };

        metrics.puppetdb.update_db_pool(pool, &pool_readings);
    }
}

fn publish_http(readings: &BeanReadings, metrics: &ExporterMetrics, errors: &mut Vec<ExtractError>) {
    for endpoint in HTTP_ENDPOINTS {
        let service_time = readings
            .histogram(&beans::http_service_time(endpoint), errors)
            .scaled(MS_PER_SECOND);
        let requests = readings.rates(&beans::http_ok_rate(endpoint), errors);

        metrics
            .puppetdb
            .update_http_endpoint(endpoint, &service_time, &requests);
    }
}

fn publish_jvm_basic(readings: &BeanReadings, metrics: &ExporterMetrics, errors: &mut Vec<ExtractError>) {
    if let Some(memory) = readings.reading(beans::MEMORY, errors) {
        for (kind, attribute) in [("heap", "HeapMemoryUsage"), ("nonheap", "NonHeapMemoryUsage")] {
            let usage = |field: &str| path_value(memory, &[attribute, field]).ok();
            metrics
                .jvm
                .update_memory(kind, usage("used"), usage("committed"), usage("max"));
        }
    }

    metrics
        .jvm
        .set_threads_active(readings.value(beans::THREADING, errors));
}

fn publish_jvm_detail(readings: &BeanReadings, metrics: &ExporterMetrics, errors: &mut Vec<ExtractError>) {
    let jvm = &metrics.jvm;

    for (bean, pool) in MEMORY_POOLS {
        if let Some(r) = readings.reading(&beans::memory_pool(bean), errors) {
            let usage = |attribute: &str, field: &str| path_value(r, &[attribute, field]).ok();
            jvm.update_memory_pool(
                pool,
                usage("Usage", "used"),
                usage("Usage", "committed"),
                usage("Usage", "max"),
                usage("PeakUsage", "used"),
            );
        }
    }

    for (bean, gc) in GARBAGE_COLLECTORS {
        if let Some(r) = readings.reading(&beans::garbage_collector(bean), errors) {
            jvm.update_gc(
                gc,
                field_value(r, "CollectionCount").ok(),
                seconds(field_value(r, "CollectionTime").ok(), MS_PER_SECOND),
                seconds(path_value(r, &["LastGcInfo", "duration"]).ok(), MS_PER_SECOND),
            );
        }
    }

    if let Some(r) = readings.reading(beans::CLASS_LOADING, errors) {
        jvm.update_class_loading(
            field_value(r, "LoadedClassCount").ok(),
            field_value(r, "UnloadedClassCount").ok(),
            field_value(r, "TotalLoadedClassCount").ok(),
        );
    }

    if let Some(r) = readings.reading(beans::COMPILATION, errors) {
        jvm.update_compilation(seconds(field_value(r, "TotalCompilationTime").ok(), MS_PER_SECOND));
    }

    if let Some(r) = readings.reading(beans::OPERATING_SYSTEM, errors) {
        for (attribute, _, _) in OS_GAUGES {
            jvm.update_os_attribute(attribute, field_value(r, attribute).ok());
        }
        jvm.update_process_cpu_time(seconds(field_value(r, "ProcessCpuTime").ok(), NS_PER_SECOND));
    }

    if let Some(r) = readings.reading(beans::RUNTIME, errors) {
        jvm.update_runtime(
            seconds(field_value(r, "Uptime").ok(), MS_PER_SECOND),
            seconds(field_value(r, "StartTime").ok(), MS_PER_SECOND),
        );
    }

    if let Some(r) = readings.reading(beans::THREADING, errors) {
        let field = |name: &str| field_value(r, name).ok();
        jvm.update_threading(
            field("TotalStartedThreadCount"),
            field("PeakThreadCount"),
            field("DaemonThreadCount"),
            field("CurrentThreadAllocatedBytes"),
            field("ThreadAllocatedMemoryEnabled"),
            field("ThreadCpuTimeEnabled"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reading(value: serde_json::Value) -> MBeanReading {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_group_bean_lists() {
        assert_eq!(CoreGroup::Population.mbeans().len(), 4);
        assert_eq!(CoreGroup::Commands.mbeans().len(), 2 + COMMAND_TOTALS.len());
        assert_eq!(CoreGroup::DbPools.mbeans().len(), DB_POOLS.len() * 10);
        assert_eq!(CoreGroup::HttpEndpoints.mbeans().len(), HTTP_ENDPOINTS.len() * 2);
        assert!(CoreGroup::DbPools
            .mbeans()
            .contains(&"puppetlabs.puppetdb.database:name=PDBReadPool.pool.Wait".to_string()));
        assert!(CoreGroup::HttpEndpoints
            .mbeans()
            .contains(&"puppetlabs.puppetdb.http:name=/pdb/cmd/v1.service-time".to_string()));
    }

    #[test]
    fn test_endpoint_labels_are_distinct() {
        let mut labels: Vec<_> = CoreGroup::ALL.iter().map(|g| g.endpoint()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), CoreGroup::ALL.len());
    }

    #[test]
    fn test_bean_readings_distinguish_failures() {
        let names = to_owned(&["a", "b", "c"]);
        let readings = BeanReadings::zip(
            &names,
            vec![
                reading(json!({"value": 7})),
                reading(json!({"error": "not found", "status": 404})),
                MBeanReading::new(),
            ],
        );

        assert!(readings.get("a").is_ok());
        assert!(matches!(readings.get("b"), Err(ExtractError::Remote { .. })));
        assert!(matches!(readings.get("c"), Err(ExtractError::UnrecognizedShape(_))));
        assert!(matches!(readings.get("d"), Err(ExtractError::UnrecognizedShape(_))));

        let mut errors = Vec::new();
        assert_eq!(readings.value("a", &mut errors), Some(7.0));
        assert_eq!(readings.value("b", &mut errors), None);
        assert_eq!(errors.len(), 1);
    }
}
