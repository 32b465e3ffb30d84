//! JVM series read from the `java.lang` MBeans
//!
//! Gauges are overwritten in place every cycle. Cumulative JVM totals (GC
//! counts, class unloads, CPU time, uptime) go through [`MonotonicCounter`].

use super::{gauge_vec, set_present, MonotonicCounter, NAMESPACE};
use prometheus::{GaugeVec, Registry};
use std::collections::HashMap;

/// (MBean `name=` value, `pool` label)
pub const MEMORY_POOLS: [(&str, &str); 4] = [
    ("G1 Eden Space", "g1_eden_space"),
    ("G1 Old Gen", "g1_old_gen"),
    ("G1 Survivor Space", "g1_survivor_space"),
    ("Metaspace", "metaspace"),
];

/// (MBean `name=` value, `gc` label)
pub const GARBAGE_COLLECTORS: [(&str, &str); 2] = [
    ("G1 Young Generation", "g1_young_generation"),
    ("G1 Old Generation", "g1_old_generation"),
];

/// `OperatingSystem` attributes exported as gauges: (attribute, metric suffix, help)
pub const OS_GAUGES: [(&str, &str, &str); 13] = [
    ("OpenFileDescriptorCount", "open_file_descriptors", "Open file descriptors"),
    ("MaxFileDescriptorCount", "max_file_descriptors", "Maximum file descriptors"),
    (
        "CommittedVirtualMemorySize",
        "committed_virtual_memory_bytes",
        "Committed virtual memory in bytes",
    ),
    ("FreePhysicalMemorySize", "free_physical_memory_bytes", "Free physical memory in bytes"),
    ("TotalPhysicalMemorySize", "total_physical_memory_bytes", "Total physical memory in bytes"),
    ("FreeMemorySize", "free_memory_bytes", "Free memory in bytes"),
    ("FreeSwapSpaceSize", "free_swap_space_bytes", "Free swap space in bytes"),
    ("TotalSwapSpaceSize", "total_swap_space_bytes", "Total swap space in bytes"),
    ("SystemLoadAverage", "system_load_average", "System load average (1m)"),
    ("ProcessCpuLoad", "process_cpu_load", "Recent CPU usage of the JVM process (0-1)"),
    ("SystemCpuLoad", "system_cpu_load", "Recent CPU usage of the whole system (0-1)"),
    ("CpuLoad", "cpu_load", "Recent CPU usage of the whole system (0-1)"),
    ("AvailableProcessors", "available_processors", "Processors available to the JVM"),
];

pub struct JvmMetrics {
    memory_used: GaugeVec,
    memory_committed: GaugeVec,
    memory_max: GaugeVec,
    threads_active: GaugeVec,

    pool_used: GaugeVec,
    pool_committed: GaugeVec,
    pool_max: GaugeVec,
    pool_peak_used: GaugeVec,

    gc_collection_count: MonotonicCounter,
    gc_collection_time: MonotonicCounter,
    gc_last_duration: GaugeVec,

    classes_loaded: GaugeVec,
    classes_unloaded: MonotonicCounter,
    classes_total_loaded: MonotonicCounter,
    compilation_time: MonotonicCounter,

    os_gauges: HashMap<&'static str, GaugeVec>,
    process_cpu_time: MonotonicCounter,

    uptime: MonotonicCounter,
    start_time: GaugeVec,

    threads_total_started: MonotonicCounter,
    threads_peak: GaugeVec,
    threads_daemon: GaugeVec,
    thread_allocated_bytes: GaugeVec,
    thread_allocated_memory_enabled: GaugeVec,
    thread_cpu_time_enabled: GaugeVec,
}

impl JvmMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let gauge = |name: &str, help: &str, labels: &[&str]| {
            gauge_vec(registry, NAMESPACE, name, help, labels)
        };
        let counter = |name: &str, help: &str, labels: &[&str]| {
            MonotonicCounter::register(registry, NAMESPACE, name, help, labels)
        };

        let mut os_gauges = HashMap::new();
        for (attribute, suffix, help) in OS_GAUGES {
            os_gauges.insert(
                attribute,
                gauge(&format!("jvm_operating_system_{suffix}"), help, &[])?,
            );
        }

        Ok(Self {
            memory_used: gauge("jvm_memory_used_bytes", "JVM memory used in bytes", &["type"])?,
            memory_committed: gauge(
                "jvm_memory_committed_bytes",
                "JVM memory committed in bytes",
                &["type"],
            )?,
            memory_max: gauge("jvm_memory_max_bytes", "JVM maximum memory in bytes", &["type"])?,
            threads_active: gauge("jvm_threads_active", "Number of live JVM threads", &[])?,

            pool_used: gauge("jvm_memory_pool_used_bytes", "Memory pool usage in bytes", &["pool"])?,
            pool_committed: gauge(
                "jvm_memory_pool_committed_bytes",
                "Memory pool committed size in bytes",
                &["pool"],
            )?,
            pool_max: gauge("jvm_memory_pool_max_bytes", "Memory pool maximum size in bytes", &["pool"])?,
            pool_peak_used: gauge(
                "jvm_memory_pool_peak_used_bytes",
                "Memory pool peak usage in bytes",
                &["pool"],
            )?,

            gc_collection_count: counter(
                "jvm_gc_collection_count",
                "Number of collections run by the garbage collector",
                &["gc"],
            )?,
            gc_collection_time: counter(
                "jvm_gc_collection_time_seconds",
                "Accumulated collection time in seconds",
                &["gc"],
            )?,
            gc_last_duration: gauge(
                "jvm_gc_last_gc_info_duration_seconds",
                "Duration of the last collection in seconds",
                &["gc"],
            )?,

            classes_loaded: gauge(
                "jvm_class_loading_loaded_class_count",
                "Classes currently loaded",
                &[],
            )?,
            classes_unloaded: counter(
                "jvm_class_loading_unloaded_class_count",
                "Classes unloaded since JVM start",
                &[],
            )?,
            classes_total_loaded: counter(
                "jvm_class_loading_total_loaded_class_count",
                "Classes loaded since JVM start",
                &[],
            )?,
            compilation_time: counter(
                "jvm_compilation_total_time_seconds",
                "Accumulated JIT compilation time in seconds",
                &[],
            )?,

            os_gauges,
            process_cpu_time: counter(
                "jvm_operating_system_process_cpu_time_seconds",
                "CPU time used by the JVM process in seconds",
                &[],
            )?,

            uptime: counter("jvm_runtime_uptime_seconds", "JVM uptime in seconds", &[])?,
            start_time: gauge(
                "jvm_runtime_start_time_seconds",
                "JVM start time (UNIX epoch)",
                &[],
            )?,

            threads_total_started: counter(
                "jvm_threading_total_started_threads",
                "Threads started since JVM start",
                &[],
            )?,
            threads_peak: gauge("jvm_threading_peak_thread_count", "Peak live thread count", &[])?,
            threads_daemon: gauge("jvm_threading_daemon_thread_count", "Live daemon threads", &[])?,
            thread_allocated_bytes: gauge(
                "jvm_threading_current_thread_allocated_bytes",
                "Bytes allocated by the reading thread",
                &[],
            )?,
            thread_allocated_memory_enabled: gauge(
                "jvm_threading_thread_allocated_memory_enabled",
                "Whether thread memory allocation measurement is enabled",
                &[],
            )?,
            thread_cpu_time_enabled: gauge(
                "jvm_threading_thread_cpu_time_enabled",
                "Whether thread CPU time measurement is enabled",
                &[],
            )?,
        })
    }

    /// `kind` is `heap` or `nonheap`
    pub fn update_memory(&self, kind: &str, used: Option<f64>, committed: Option<f64>, max: Option<f64>) {
        set_present(&self.memory_used, &[kind], used);
        set_present(&self.memory_committed, &[kind], committed);
        set_present(&self.memory_max, &[kind], max);
    }

    pub fn set_threads_active(&self, threads: Option<f64>) {
        set_present(&self.threads_active, &[], threads);
    }

    pub fn update_memory_pool(
        &self,
        pool: &str,
        used: Option<f64>,
        committed: Option<f64>,
        max: Option<f64>,
        peak_used: Option<f64>,
    ) {
        set_present(&self.pool_used, &[pool], used);
        set_present(&self.pool_committed, &[pool], committed);
        set_present(&self.pool_max, &[pool], max);
        set_present(&self.pool_peak_used, &[pool], peak_used);
    }

    /// Times in seconds
    pub fn update_gc(
        &self,
        gc: &str,
        collection_count: Option<f64>,
        collection_time: Option<f64>,
        last_duration: Option<f64>,
    ) {
        self.gc_collection_count.observe_total(&[gc], collection_count);
        self.gc_collection_time.observe_total(&[gc], collection_time);
        set_present(&self.gc_last_duration, &[gc], last_duration);
    }

    pub fn update_class_loading(&self, loaded: Option<f64>, unloaded: Option<f64>, total_loaded: Option<f64>) {
        set_present(&self.classes_loaded, &[], loaded);
        self.classes_unloaded.observe_total(&[], unloaded);
        self.classes_total_loaded.observe_total(&[], total_loaded);
    }

    /// Total JIT time in seconds
    pub fn update_compilation(&self, total_time: Option<f64>) {
        self.compilation_time.observe_total(&[], total_time);
    }

    /// Raw `OperatingSystem` attribute value; unknown attributes are ignored
    pub fn update_os_attribute(&self, attribute: &str, value: Option<f64>) {
        if let Some(vec) = self.os_gauges.get(attribute) {
            set_present(vec, &[], value);
        }
    }

    /// Process CPU time in seconds
    pub fn update_process_cpu_time(&self, seconds: Option<f64>) {
        self.process_cpu_time.observe_total(&[], seconds);
    }

    /// Uptime and start time in seconds
    pub fn update_runtime(&self, uptime: Option<f64>, start_time: Option<f64>) {
        self.uptime.observe_total(&[], uptime);
        set_present(&self.start_time, &[], start_time);
    }

    pub fn update_threading(
        &self,
        total_started: Option<f64>,
        peak: Option<f64>,
        daemon: Option<f64>,
        current_thread_allocated_bytes: Option<f64>,
        allocated_memory_enabled: Option<f64>,
        cpu_time_enabled: Option<f64>,
    ) {
        self.threads_total_started.observe_total(&[], total_started);
        set_present(&self.threads_peak, &[], peak);
        set_present(&self.threads_daemon, &[], daemon);
        set_present(&self.thread_allocated_bytes, &[], current_thread_allocated_bytes);
        set_present(&self.thread_allocated_memory_enabled, &[], allocated_memory_enabled);
        set_present(&self.thread_cpu_time_enabled, &[], cpu_time_enabled);
    }
}
