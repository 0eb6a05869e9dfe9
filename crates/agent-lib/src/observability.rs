//! Observability infrastructure for the JVM agent
//!
//! Provides:
//! - Prometheus metrics (resolution latency, per-JVM heap settings, node pressure, OOM kills)
//! - Structured JSON logging with tracing

use crate::jvm::HeapSetting;
use crate::models::{JvmSnapshot, NodePressureReport};
use crate::node::PressureMetrics;
use crate::oom::{memory_pressure_category, memory_usage_category, OomContext};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

const JVM_LABELS: &[&str] = &["pid", "process_name", "container_id"];

struct AgentMetricsInner {
    collection_latency_seconds: Histogram,
    resolution_latency_seconds: Histogram,
    jvms_monitored: IntGauge,
    jvm_info: GaugeVec,
    heap_max_bytes: GaugeVec,
    heap_initial_bytes: GaugeVec,
    heap_max_percentage: GaugeVec,
    heap_initial_percentage: GaugeVec,
    attach_failures: IntCounter,
    collection_errors: IntCounter,
    node_pressure: GaugeVec,
    memory_pressure_level: IntGauge,
    oom_kills: IntCounterVec,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "jvm_agent_collection_latency_seconds",
                "Time spent on one full collection cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            resolution_latency_seconds: register_histogram!(
                "jvm_agent_resolution_latency_seconds",
                "Time spent resolving the configuration of one JVM",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register resolution_latency_seconds"),

            jvms_monitored: register_int_gauge!(
                "jvm_agent_jvms_monitored",
                "Number of JVM processes currently being monitored"
            )
            .expect("Failed to register jvms_monitored"),

            jvm_info: register_gauge_vec!(
                "jvm_agent_jvm_info",
                "Vendor, collector and resolution source of each JVM",
                &["pid", "process_name", "container_id", "vendor", "gc_type", "source"]
            )
            .expect("Failed to register jvm_info"),

            heap_max_bytes: register_gauge_vec!(
                "jvm_agent_heap_max_bytes",
                "Absolute maximum heap size, absent when unset or percentage-governed",
                JVM_LABELS
            )
            .expect("Failed to register heap_max_bytes"),

            heap_initial_bytes: register_gauge_vec!(
                "jvm_agent_heap_initial_bytes",
                "Absolute initial heap size, absent when unset or percentage-governed",
                JVM_LABELS
            )
            .expect("Failed to register heap_initial_bytes"),

            heap_max_percentage: register_gauge_vec!(
                "jvm_agent_heap_max_percentage",
                "MaxRAMPercentage in effect for each JVM",
                JVM_LABELS
            )
            .expect("Failed to register heap_max_percentage"),

            heap_initial_percentage: register_gauge_vec!(
                "jvm_agent_heap_initial_percentage",
                "InitialRAMPercentage in effect for each JVM",
                JVM_LABELS
            )
            .expect("Failed to register heap_initial_percentage"),

            attach_failures: register_int_counter!(
                "jvm_agent_attach_failures_total",
                "Resolutions that fell back to command line and environment"
            )
            .expect("Failed to register attach_failures"),

            collection_errors: register_int_counter!(
                "jvm_agent_collection_errors_total",
                "Total number of collection errors"
            )
            .expect("Failed to register collection_errors"),

            node_pressure: register_gauge_vec!(
                "jvm_agent_node_pressure_percent",
                "Pressure stall averages from /proc/pressure",
                &["resource", "line", "window"]
            )
            .expect("Failed to register node_pressure"),

            memory_pressure_level: register_int_gauge!(
                "jvm_agent_memory_pressure_level",
                "Memory pressure level, 0 (none) to 4 (critical)"
            )
            .expect("Failed to register memory_pressure_level"),

            oom_kills: register_int_counter_vec!(
                "jvm_agent_oom_kills_total",
                "JVM OOM kills by node conditions at the time of the kill",
                &["pressure_category", "usage_category"]
            )
            .expect("Failed to register oom_kills"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }

    pub fn observe_resolution_latency(&self, duration_secs: f64) {
        self.inner().resolution_latency_seconds.observe(duration_secs);
    }

    pub fn set_jvms_monitored(&self, count: i64) {
        self.inner().jvms_monitored.set(count);
    }

    pub fn inc_attach_failures(&self) {
        self.inner().attach_failures.inc();
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    /// Publish the heap and collector series of one JVM
    pub fn set_jvm(&self, snapshot: &JvmSnapshot) {
        let inner = self.inner();
        // Vendor or collector may change between cycles
        self.remove_jvm(snapshot);

        let pid = snapshot.pid.to_string();
        let labels = [pid.as_str(), snapshot.process_name.as_str(), snapshot.container_id()];
        let config = &snapshot.config;

        inner
            .jvm_info
            .with_label_values(&[
                labels[0],
                labels[1],
                labels[2],
                config.vendor.as_str(),
                config.gc_type.as_str(),
                snapshot.source.as_str(),
            ])
            .set(1.0);

        if let HeapSetting::Bytes(bytes) = config.max_heap() {
            inner.heap_max_bytes.with_label_values(&labels).set(bytes);
        }
        if let HeapSetting::Bytes(bytes) = config.initial_heap() {
            inner.heap_initial_bytes.with_label_values(&labels).set(bytes);
        }
        inner
            .heap_max_percentage
            .with_label_values(&labels)
            .set(config.max_heap_percentage);
        inner
            .heap_initial_percentage
            .with_label_values(&labels)
            .set(config.initial_heap_percentage);
    }

    /// Drop every series of a JVM that is gone
    pub fn remove_jvm(&self, snapshot: &JvmSnapshot) {
        let inner = self.inner();
        let pid = snapshot.pid.to_string();
        let labels = [pid.as_str(), snapshot.process_name.as_str(), snapshot.container_id()];
        let config = &snapshot.config;

        // Missing series are not an error
        let _ = inner.jvm_info.remove_label_values(&[
            labels[0],
            labels[1],
            labels[2],
            config.vendor.as_str(),
            config.gc_type.as_str(),
            snapshot.source.as_str(),
        ]);
        for vec in [
            &inner.heap_max_bytes,
            &inner.heap_initial_bytes,
            &inner.heap_max_percentage,
            &inner.heap_initial_percentage,
        ] {
            let _ = vec.remove_label_values(&labels);
        }
    }

    /// Publish pressure stall averages and the derived memory level
    pub fn set_node_pressure(&self, report: &NodePressureReport) {
        let inner = self.inner();
        let resources = [
            ("cpu", &report.pressure.cpu),
            ("memory", &report.pressure.memory),
            ("io", &report.pressure.io),
        ];

        for (resource, stats) in resources {
            for (line, metrics) in [("some", &stats.some), ("full", &stats.full)] {
                set_windows(&inner.node_pressure, resource, line, metrics);
            }
        }

        inner
            .memory_pressure_level
            .set(report.memory_pressure_level.as_gauge());
    }

    pub fn inc_oom_kills(&self, context: &OomContext) {
        self.inner()
            .oom_kills
            .with_label_values(&[
                memory_pressure_category(context.memory_pressure.as_str()),
                memory_usage_category(context.node_memory_usage),
            ])
            .inc();
    }
}

fn set_windows(vec: &GaugeVec, resource: &str, line: &str, metrics: &PressureMetrics) {
    for (window, value) in [
        ("avg10", metrics.avg10),
        ("avg60", metrics.avg60),
        ("avg300", metrics.avg300),
    ] {
        vec.with_label_values(&[resource, line, window]).set(value);
    }
}

/// Structured logger for agent events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log a resolved JVM configuration
    pub fn log_jvm_resolved(&self, snapshot: &JvmSnapshot) {
        let config = &snapshot.config;
        info!(
            event = "jvm_resolved",
            node = %self.node_name,
            pid = snapshot.pid,
            process_name = %snapshot.process_name,
            container_id = %snapshot.container_id(),
            vendor = %config.vendor,
            gc_type = %config.gc_type,
            source = snapshot.source.as_str(),
            max_heap_bytes = config.max_heap_bytes,
            max_heap_percentage = config.max_heap_percentage,
            initial_heap_bytes = config.initial_heap_bytes,
            initial_heap_percentage = config.initial_heap_percentage,
            "Resolved JVM configuration"
        );
    }

    /// Log a resolution that could not use the live JVM
    pub fn log_attach_fallback(&self, pid: u32, error: &str) {
        warn!(
            event = "attach_fallback",
            node = %self.node_name,
            pid = pid,
            error = %error,
            "Attach failed, resolved from command line and environment"
        );
    }

    pub fn log_jvm_exited(&self, pid: u32, process_name: &str) {
        info!(
            event = "jvm_exited",
            node = %self.node_name,
            pid = pid,
            process_name = %process_name,
            "JVM process is gone"
        );
    }

    /// Log an OOM kill of a monitored JVM
    pub fn log_oom(&self, context: &OomContext) {
        warn!(
            event = "oom_kill",
            node = %self.node_name,
            pid = context.pid,
            process_name = %context.process_name,
            container = %context.container_name,
            memory_pressure = %context.memory_pressure,
            node_memory_usage = context.node_memory_usage,
            container_mem_usage = context.container_mem_usage,
            container_mem_limit = context.container_mem_limit,
            "JVM killed by the OOM killer"
        );
    }

    /// Log a change of the node memory pressure level
    pub fn log_pressure_transition(&self, previous: &str, report: &NodePressureReport) {
        if report.memory_pressure_high {
            warn!(
                event = "pressure_transition",
                node = %self.node_name,
                previous = %previous,
                current = %report.memory_pressure_level,
                memory_some_avg10 = report.pressure.memory.some.avg10,
                "Memory pressure is high"
            );
        } else {
            info!(
                event = "pressure_transition",
                node = %self.node_name,
                previous = %previous,
                current = %report.memory_pressure_level,
                memory_some_avg10 = report.pressure.memory.some.avg10,
                "Memory pressure changed"
            );
        }
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, attach_enabled: bool) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            attach_enabled = attach_enabled,
            "JVM agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "JVM agent shutting down"
        );
    }
}
