//! JVM collection loop
//!
//! Periodically discovers JVMs, resolves the configuration of new ones,
//! refreshes their container memory, attributes OOM kills to JVMs that
//! vanished and samples node pressure. Intervals carry jitter and stretch
//! out when a cycle runs slow.
//!
//! A JVM whose live attach failed transiently is resolved again after 1, 2,
//! 4, ... cycles, up to `attach_max_retries` times.

use super::{ContainerMemoryReader, JvmRegistry, ProcessDiscovery};
use crate::health::{Component, HealthRegistry};
use crate::jvm::{JvmParamResolver, ResolutionSource};
use crate::models::{ContainerMemory, JvmProcessInfo, JvmSnapshot, NodePressureReport};
use crate::node::{MemoryInfo, MemoryPressureLevel, SystemPressure};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::oom::{read_oom_kill_count, OomContextCollector, OomVictim};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};

/// Latest node pressure report, shared with the API
pub type SharedPressure = Arc<RwLock<Option<NodePressureReport>>>;

/// Configuration for the collection loop
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Base collection interval (default: 30 seconds)
    pub interval: Duration,
    /// Maximum jitter to add to interval (default: 1 second)
    pub jitter: Duration,
    /// Interval used while cycles run slow (default: 120 seconds)
    pub degraded_interval: Duration,
    /// Cycle duration that switches to the degraded interval
    pub slow_cycle_threshold: Duration,
    /// Where pressure, meminfo and vmstat are read from
    pub proc_root: PathBuf,
    /// Ask newly seen JVMs to write a perf map
    pub perfmap_enabled: bool,
    /// Re-resolutions after a transient attach failure before settling for
    /// command line and environment data
    pub attach_max_retries: u32,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
            degraded_interval: Duration::from_secs(120),
            slow_cycle_threshold: Duration::from_secs(5),
            proc_root: PathBuf::from("/proc"),
            perfmap_enabled: false,
            attach_max_retries: 5,
        }
    }
}

/// Pending re-resolution of a JVM whose attach failed
#[derive(Debug, Clone, Copy, PartialEq)]
struct AttachRetry {
    failures: u32,
    due_cycle: u64,
}

/// Collection loop that keeps the JVM registry and node pressure current
pub struct CollectionLoop {
    discovery: Arc<dyn ProcessDiscovery>,
    memory_reader: Option<Arc<dyn ContainerMemoryReader>>,
    resolver: JvmParamResolver,
    registry: Arc<JvmRegistry>,
    oom: Arc<OomContextCollector>,
    pressure: SharedPressure,
    health: Option<HealthRegistry>,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    config: CollectionConfig,
    degraded_mode: bool,
    last_oom_kill_count: Option<u64>,
    cycle: u64,
    attach_retries: HashMap<u32, AttachRetry>,
}

/// Results from a collection cycle
#[derive(Debug, Default, PartialEq)]
pub struct CycleResults {
    pub discovered: usize,
    pub resolved: usize,
    pub exited: usize,
    pub oom_kills: usize,
    pub errors: usize,
}

impl CollectionLoop {
    /// Start the collection loop, stopping when `shutdown` fires
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            perfmap_enabled = self.config.perfmap_enabled,
            "Starting JVM collection loop"
        );

        let mut ticker = interval(self.current_interval());
        let mut first_cycle = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let results = self.collect_once().await;
                    let elapsed = start.elapsed();

                    self.metrics.observe_collection_latency(elapsed.as_secs_f64());
                    debug!(
                        discovered = results.discovered,
                        resolved = results.resolved,
                        exited = results.exited,
                        errors = results.errors,
                        elapsed_ms = elapsed.as_millis(),
                        degraded = self.degraded_mode,
                        "Collection cycle complete"
                    );

                    if first_cycle {
                        if let Some(health) = &self.health {
                            health.set_ready(true).await;
                        }
                        first_cycle = false;
                    }

                    if self.check_resource_pressure(elapsed) {
                        ticker = interval(self.current_interval());
                        // The first tick of a fresh interval is immediate
                        ticker.tick().await;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down JVM collection loop");
                    break;
                }
            }
        }
    }

    /// Get the current collection interval (accounting for degraded mode)
    fn current_interval(&self) -> Duration {
        let base = if self.degraded_mode {
            self.config.degraded_interval
        } else {
            self.config.interval
        };

        // Add jitter to prevent thundering herd
        let jitter_ms = rand_jitter(self.config.jitter.as_millis() as u64);
        base + Duration::from_millis(jitter_ms)
    }

    /// Run one full cycle
    pub async fn collect_once(&mut self) -> CycleResults {
        let mut results = CycleResults::default();
        self.cycle += 1;

        let discovered = self.discovery.discover().await;
        self.report_health(Component::Discovery, &discovered).await;
        let discovered = match discovered {
            Ok(processes) => processes,
            Err(e) => {
                warn!(error = %e, "JVM discovery failed");
                self.metrics.inc_collection_errors();
                results.errors += 1;
                self.sample_pressure().await;
                return results;
            }
        };
        results.discovered = discovered.len();

        let live: HashSet<u32> = discovered.iter().map(|p| p.pid).collect();
        let mut resolve_errors = 0;

        for process in discovered {
            let container = self.read_container_memory(process.pid).await;

            let known = self
                .registry
                .get(process.pid)
                .filter(|known| known.cmdline == process.cmdline);
            if known.is_none() {
                self.attach_retries.remove(&process.pid);
            }

            match known {
                Some(mut known) if !self.attach_retry_due(process.pid) => {
                    known.container = container;
                    known.last_updated = chrono::Utc::now().timestamp();
                    self.registry.upsert(known);
                }
                _ => match self.resolve(&process, container).await {
                    Ok((snapshot, retryable)) => {
                        results.resolved += 1;
                        self.track_attach_retry(&snapshot, retryable);
                        self.metrics.set_jvm(&snapshot);
                        self.logger.log_jvm_resolved(&snapshot);
                        if self.config.perfmap_enabled && snapshot.perfmap_supported {
                            self.request_perfmap(snapshot.pid);
                        }
                        self.registry.upsert(snapshot);
                    }
                    Err(e) => {
                        warn!(pid = process.pid, error = %e, "JVM resolution failed");
                        self.metrics.inc_collection_errors();
                        resolve_errors += 1;
                    }
                },
            }
        }
        results.errors += resolve_errors;

        let resolver_health: Result<(), String> = if resolve_errors == 0 {
            Ok(())
        } else {
            Err(format!("{} resolutions failed", resolve_errors))
        };
        self.report_health(Component::Resolver, &resolver_health).await;

        let gone = self.registry.retain_live(&live);
        self.attach_retries.retain(|pid, _| live.contains(pid));
        for snapshot in &gone {
            self.metrics.remove_jvm(snapshot);
            self.logger.log_jvm_exited(snapshot.pid, &snapshot.process_name);
        }
        results.exited = gone.len();
        results.oom_kills = self.attribute_oom_kills(&gone).await;

        self.metrics.set_jvms_monitored(self.registry.len() as i64);
        self.sample_pressure().await;

        results
    }

    async fn read_container_memory(&self, pid: u32) -> Option<ContainerMemory> {
        let reader = self.memory_reader.as_ref()?;
        match reader.read(pid).await {
            Ok(memory) => memory,
            Err(e) => {
                debug!(pid = pid, error = %e, "No container memory for process");
                None
            }
        }
    }

    fn attach_retry_due(&self, pid: u32) -> bool {
        self.attach_retries
            .get(&pid)
            .is_some_and(|retry| retry.due_cycle <= self.cycle)
    }

    /// Schedule another attempt after a transient attach failure, doubling
    /// the wait each time
    fn track_attach_retry(&mut self, snapshot: &JvmSnapshot, retryable: bool) {
        let pid = snapshot.pid;
        if snapshot.source != ResolutionSource::Fallback || !retryable {
            self.attach_retries.remove(&pid);
            return;
        }

        let failures = self.attach_retries.get(&pid).map_or(0, |r| r.failures) + 1;
        if failures > self.config.attach_max_retries {
            self.attach_retries.remove(&pid);
            debug!(pid = pid, failures = failures, "Giving up on live attach");
            return;
        }

        let wait = 1u64 << (failures - 1).min(16);
        self.attach_retries.insert(
            pid,
            AttachRetry {
                failures,
                due_cycle: self.cycle + wait,
            },
        );
    }

    /// Resolve off the async runtime; attaching blocks on socket I/O.
    /// The flag tells whether a failed attach is worth retrying.
    async fn resolve(
        &self,
        process: &JvmProcessInfo,
        container: Option<ContainerMemory>,
    ) -> Result<(JvmSnapshot, bool)> {
        let resolver = self.resolver.clone();
        let pid = process.pid;
        let cmdline = process.cmdline.clone();

        let start = Instant::now();
        let resolution =
            tokio::task::spawn_blocking(move || resolver.resolve(pid, &cmdline)).await?;
        self.metrics
            .observe_resolution_latency(start.elapsed().as_secs_f64());

        if let Some(error) = &resolution.attach_error {
            if resolution.source == ResolutionSource::Fallback {
                self.metrics.inc_attach_failures();
                self.logger.log_attach_fallback(pid, error);
            }
        }

        let retryable = resolution.attach_retryable;
        let now = chrono::Utc::now().timestamp();
        let snapshot = JvmSnapshot {
            pid,
            process_name: process.process_name.clone(),
            node_name: self.registry.node_name().to_string(),
            cmdline: process.cmdline.clone(),
            config: resolution.config,
            source: resolution.source,
            attach_error: resolution.attach_error,
            container,
            perfmap_supported: process.perfmap_supported,
            first_seen: now,
            last_updated: now,
        };
        Ok((snapshot, retryable))
    }

    fn request_perfmap(&self, pid: u32) {
        let resolver = self.resolver.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = resolver.dump_perfmap(pid) {
                warn!(pid = pid, error = %e, "Perf map dump failed");
            }
        });
    }

    /// Attribute an increase of the kernel OOM counter to JVMs that vanished
    /// in the same cycle
    async fn attribute_oom_kills(&mut self, gone: &[JvmSnapshot]) -> usize {
        let count = match read_oom_kill_count(&self.config.proc_root).await {
            Ok(count) => count,
            Err(e) => {
                debug!(error = %e, "OOM kill counter unavailable");
                return 0;
            }
        };

        let previous = self.last_oom_kill_count.replace(count);
        let delta = match previous {
            Some(previous) if count > previous => (count - previous) as usize,
            _ => return 0,
        };

        let mut attributed = 0;
        for snapshot in gone.iter().take(delta) {
            let context = self.oom.record_oom(victim_of(snapshot)).await;
            self.metrics.inc_oom_kills(&context);
            self.logger.log_oom(&context);
            attributed += 1;
        }
        attributed
    }

    async fn sample_pressure(&self) {
        let pressure = SystemPressure::read(&self.config.proc_root).await;
        let memory = MemoryInfo::read(&self.config.proc_root).await;
        self.report_health(Component::Pressure, &memory).await;

        let report = NodePressureReport::new(self.registry.node_name(), pressure, memory.ok());
        self.metrics.set_node_pressure(&report);

        let mut shared = self.pressure.write().await;
        let previous = shared
            .as_ref()
            .map(|r| r.memory_pressure_level)
            .unwrap_or(MemoryPressureLevel::None);
        if previous != report.memory_pressure_level {
            self.logger
                .log_pressure_transition(previous.as_str(), &report);
        }
        *shared = Some(report);
    }

    async fn report_health<T, E: std::fmt::Display>(
        &self,
        component: Component,
        result: &Result<T, E>,
    ) {
        if let Some(health) = &self.health {
            health.record(component, result).await;
        }
    }

    /// Check cycle duration and adjust collection mode. Returns true when
    /// the mode changed.
    fn check_resource_pressure(&mut self, collection_duration: Duration) -> bool {
        let threshold = self.config.slow_cycle_threshold;

        if collection_duration > threshold && !self.degraded_mode {
            warn!(
                elapsed_ms = collection_duration.as_millis(),
                "Entering degraded mode due to slow collection"
            );
            self.degraded_mode = true;
            true
        } else if collection_duration < threshold / 2 && self.degraded_mode {
            info!("Exiting degraded mode, collection performance improved");
            self.degraded_mode = false;
            true
        } else {
            false
        }
    }
}

fn victim_of(snapshot: &JvmSnapshot) -> OomVictim {
    let container = snapshot.container.as_ref();
    OomVictim {
        pid: snapshot.pid,
        process_name: snapshot.process_name.clone(),
        container_name: snapshot.container_id().to_string(),
        container_mem_limit: container.and_then(|c| c.limit_bytes).unwrap_or(0),
        container_mem_usage: container.map(|c| c.usage_bytes).unwrap_or(0),
    }
}

/// Generate a random jitter value between 0 and max_ms
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }

    // Pseudo-random from the clock; only needs to spread agents apart
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    now % max_ms
}

/// Builder for creating the collection loop
pub struct CollectionLoopBuilder {
    discovery: Option<Arc<dyn ProcessDiscovery>>,
    memory_reader: Option<Arc<dyn ContainerMemoryReader>>,
    resolver: Option<JvmParamResolver>,
    registry: Option<Arc<JvmRegistry>>,
    oom: Option<Arc<OomContextCollector>>,
    pressure: Option<SharedPressure>,
    health: Option<HealthRegistry>,
    config: CollectionConfig,
}

impl CollectionLoopBuilder {
    pub fn new() -> Self {
        Self {
            discovery: None,
            memory_reader: None,
            resolver: None,
            registry: None,
            oom: None,
            pressure: None,
            health: None,
            config: CollectionConfig::default(),
        }
    }

    pub fn discovery(mut self, discovery: Arc<dyn ProcessDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Optional; without it snapshots carry no container memory
    pub fn memory_reader(mut self, reader: Arc<dyn ContainerMemoryReader>) -> Self {
        self.memory_reader = Some(reader);
        self
    }

    pub fn resolver(mut self, resolver: JvmParamResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn registry(mut self, registry: Arc<JvmRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn oom_collector(mut self, oom: Arc<OomContextCollector>) -> Self {
        self.oom = Some(oom);
        self
    }

    pub fn pressure(mut self, pressure: SharedPressure) -> Self {
        self.pressure = Some(pressure);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn config(mut self, config: CollectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<CollectionLoop> {
        let discovery = self
            .discovery
            .ok_or_else(|| anyhow::anyhow!("Discovery is required"))?;
        let resolver = self
            .resolver
            .ok_or_else(|| anyhow::anyhow!("Resolver is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("Registry is required"))?;

        let logger = StructuredLogger::new(registry.node_name());
        let oom = self
            .oom
            .unwrap_or_else(|| Arc::new(OomContextCollector::new(&self.config.proc_root)));

        Ok(CollectionLoop {
            discovery,
            memory_reader: self.memory_reader,
            resolver,
            registry,
            oom,
            pressure: self.pressure.unwrap_or_default(),
            health: self.health,
            metrics: AgentMetrics::new(),
            logger,
            config: self.config,
            degraded_mode: false,
            last_oom_kill_count: None,
            cycle: 0,
            attach_retries: HashMap::new(),
        })
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
