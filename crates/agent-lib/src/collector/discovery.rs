//! JVM discovery and lifecycle tracking
//!
//! Scans procfs for JVM processes and keeps the latest snapshot of each
//! one in a registry shared with the API.

use super::{async_trait, ProcessDiscovery};
use crate::models::{JvmProcessInfo, JvmSnapshot};
use crate::process;
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Registry of monitored JVMs on the node
pub struct JvmRegistry {
    /// Map of pid -> latest snapshot
    jvms: DashMap<u32, JvmSnapshot>,
    node_name: String,
}

impl JvmRegistry {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            jvms: DashMap::new(),
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Insert or replace a snapshot, keeping the first-seen time of a known pid
    pub fn upsert(&self, mut snapshot: JvmSnapshot) {
        snapshot.node_name = self.node_name.clone();
        if let Some(existing) = self.jvms.get(&snapshot.pid) {
            snapshot.first_seen = existing.first_seen;
        }
        debug!(pid = snapshot.pid, "Registering JVM");
        self.jvms.insert(snapshot.pid, snapshot);
    }

    pub fn unregister(&self, pid: u32) -> Option<JvmSnapshot> {
        debug!(pid = pid, "Unregistering JVM");
        self.jvms.remove(&pid).map(|(_, v)| v)
    }

    pub fn get(&self, pid: u32) -> Option<JvmSnapshot> {
        self.jvms.get(&pid).map(|r| r.clone())
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.jvms.contains_key(&pid)
    }

    /// All snapshots ordered by pid
    pub fn list(&self) -> Vec<JvmSnapshot> {
        let mut jvms: Vec<JvmSnapshot> = self.jvms.iter().map(|r| r.value().clone()).collect();
        jvms.sort_by_key(|j| j.pid);
        jvms
    }

    pub fn len(&self) -> usize {
        self.jvms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jvms.is_empty()
    }

    /// Remove every pid not in `live` and return the removed snapshots
    pub fn retain_live(&self, live: &HashSet<u32>) -> Vec<JvmSnapshot> {
        let gone: Vec<u32> = self
            .jvms
            .iter()
            .map(|r| *r.key())
            .filter(|pid| !live.contains(pid))
            .collect();

        gone.into_iter().filter_map(|pid| self.unregister(pid)).collect()
    }
}

/// Finds JVMs by scanning the proc root
pub struct ProcfsDiscovery {
    proc_root: PathBuf,
}

impl ProcfsDiscovery {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Blocking scan; processes that exit mid-scan are skipped
    pub fn scan(proc_root: &Path) -> Result<Vec<JvmProcessInfo>> {
        let pids = process::list_pids(proc_root)
            .with_context(|| format!("Failed to list {}", proc_root.display()))?;

        Ok(pids
            .into_iter()
            .filter_map(|pid| Self::inspect(proc_root, pid))
            .collect())
    }

    fn inspect(proc_root: &Path, pid: u32) -> Option<JvmProcessInfo> {
        let cmdline = process::read_cmdline(proc_root, pid)?;
        if !process::is_jvm(&cmdline) {
            return None;
        }

        Some(JvmProcessInfo {
            pid,
            process_name: process::read_comm(proc_root, pid).unwrap_or_default(),
            cmdline: process::cmdline_to_string(&cmdline),
            perfmap_supported: process::is_perfmap_dump_supported(&cmdline),
        })
    }
}

#[async_trait]
impl ProcessDiscovery for ProcfsDiscovery {
    async fn discover(&self) -> Result<Vec<JvmProcessInfo>> {
        let proc_root = self.proc_root.clone();
        tokio::task::spawn_blocking(move || Self::scan(&proc_root))
            .await
            .context("Discovery task panicked")?
    }
}
