//! OOM kill context
//!
//! When a JVM disappears after the kernel's OOM killer fired, the collection
//! loop records what the node and container looked like at that moment.

use crate::node::{MemoryInfo, MemoryPressureLevel, SystemPressure};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

/// Upper bound on retained contexts; the oldest is evicted first
pub const MAX_RECENT_OOMS: usize = 100;

/// Snapshot of memory conditions around one OOM kill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OomContext {
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
    pub memory_pressure: MemoryPressureLevel,
    /// Percentage of node memory in use
    pub node_memory_usage: f64,
    pub container_mem_limit: u64,
    pub container_mem_usage: u64,
    pub process_name: String,
    pub container_name: String,
    /// `-1` when the process was already gone
    pub oom_score: i32,
}

/// What the caller knows about the killed process
#[derive(Debug, Clone, Default)]
pub struct OomVictim {
    pub pid: u32,
    pub process_name: String,
    pub container_name: String,
    pub container_mem_limit: u64,
    pub container_mem_usage: u64,
}

/// Retains recent OOM contexts keyed by pid
pub struct OomContextCollector {
    proc_root: PathBuf,
    recent: RwLock<HashMap<u32, OomContext>>,
}

impl OomContextCollector {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            recent: RwLock::new(HashMap::new()),
        }
    }

    /// Capture node conditions and store the context for `victim`
    pub async fn record_oom(&self, victim: OomVictim) -> OomContext {
        let pressure = SystemPressure::read(&self.proc_root).await;
        let node_memory_usage = MemoryInfo::read(&self.proc_root)
            .await
            .map(|m| m.used_percent())
            .unwrap_or(0.0);

        let context = OomContext {
            pid: victim.pid,
            timestamp: Utc::now(),
            memory_pressure: pressure.memory_pressure_level(),
            node_memory_usage,
            container_mem_limit: victim.container_mem_limit,
            container_mem_usage: victim.container_mem_usage,
            process_name: victim.process_name,
            container_name: victim.container_name,
            oom_score: -1,
        };

        self.insert(context.clone()).await;
        context
    }

    async fn insert(&self, context: OomContext) {
        let mut recent = self.recent.write().await;
        recent.insert(context.pid, context);

        if recent.len() > MAX_RECENT_OOMS {
            let oldest = recent
                .values()
                .min_by_key(|c| c.timestamp)
                .map(|c| c.pid);
            if let Some(pid) = oldest {
                recent.remove(&pid);
            }
        }
    }

    pub async fn get(&self, pid: u32) -> Option<OomContext> {
        self.recent.read().await.get(&pid).cloned()
    }

    /// All retained contexts, newest first
    pub async fn recent(&self) -> Vec<OomContext> {
        let mut contexts: Vec<OomContext> = self.recent.read().await.values().cloned().collect();
        contexts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        contexts
    }

    pub async fn len(&self) -> usize {
        self.recent.read().await.len()
    }
}

/// Cumulative `oom_kill` counter from `/proc/vmstat`
pub async fn read_oom_kill_count(proc_root: &Path) -> Result<u64> {
    let path = proc_root.join("vmstat");
    let content = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    content
        .lines()
        .find_map(|line| line.strip_prefix("oom_kill "))
        .context("oom_kill not present in vmstat")?
        .trim()
        .parse()
        .context("Failed to parse oom_kill")
}

/// Label for a pressure level on OOM metrics
pub fn memory_pressure_category(level: &str) -> &'static str {
    match level {
        "none" => "none",
        "low" => "low",
        "medium" => "medium",
        "high" | "critical" => "high",
        _ => "unknown",
    }
}

/// Label for node memory usage on OOM metrics
pub fn memory_usage_category(usage_percent: f64) -> &'static str {
    if usage_percent < 50.0 {
        "low"
    } else if usage_percent < 80.0 {
        "medium"
    } else if usage_percent < 95.0 {
        "high"
    } else {
        "critical"
    }
}
