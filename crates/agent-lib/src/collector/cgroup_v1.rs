//! cgroup v1 memory accounting (fallback)
//!
//! Reads from the legacy memory controller:
//! - memory.usage_in_bytes for current usage
//! - memory.limit_in_bytes for the limit
//! - memory.stat for the working set estimate

use super::{async_trait, extract_container_id, parse_memory_stat, ContainerMemoryReader};
use crate::models::ContainerMemory;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Limits at or above this are the kernel's "unlimited" (page-rounded i64::MAX)
const UNLIMITED_THRESHOLD: u64 = 1 << 62;

/// Memory reader for the legacy cgroup v1 hierarchy
pub struct CgroupV1Reader {
    /// Root path for cgroup v1 controllers (typically /sys/fs/cgroup)
    cgroup_root: PathBuf,
    proc_path: PathBuf,
}

impl CgroupV1Reader {
    pub fn new(cgroup_root: impl Into<PathBuf>) -> Self {
        Self::with_proc_path(cgroup_root, "/proc")
    }

    /// Create reader with custom proc path (for testing)
    pub fn with_proc_path(cgroup_root: impl Into<PathBuf>, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_root: cgroup_root.into(),
            proc_path: proc_path.into(),
        }
    }

    /// Check if the v1 memory controller is mounted
    pub async fn is_available(&self) -> bool {
        fs::metadata(self.cgroup_root.join("memory")).await.is_ok()
    }

    async fn read_value(&self, cgroup_path: &Path, filename: &str) -> Result<u64> {
        let file_path = cgroup_path.join(filename);
        let content = fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("Failed to read {}", file_path.display()))?;

        content
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {}", filename))
    }

    /// `None` when the limit is the kernel's unlimited marker
    pub fn normalize_limit(limit: u64) -> Option<u64> {
        (limit < UNLIMITED_THRESHOLD).then_some(limit)
    }

    /// Parse /proc/{pid}/cgroup to get cgroup paths for a process (v1 format)
    /// Returns a map of controller -> path
    pub async fn get_cgroup_paths_for_pid(&self, pid: u32) -> Result<HashMap<String, String>> {
        let cgroup_file = self.proc_path.join(format!("{}/cgroup", pid));
        let content = fs::read_to_string(&cgroup_file)
            .await
            .with_context(|| format!("Failed to read cgroup for pid {}", pid))?;

        let mut paths = HashMap::new();

        // cgroup v1 format: "hierarchy-ID:controller-list:cgroup-path"
        // Example: "4:memory:/docker/abc123..."
        for line in content.lines() {
            let parts: Vec<&str> = line.splitn(3, ':').collect();
            if parts.len() == 3 {
                let controllers = parts[1];
                let path = parts[2];

                // Skip the unified hierarchy entry (empty controller list)
                if controllers.is_empty() {
                    continue;
                }

                // Handle comma-separated controllers (e.g., "cpu,cpuacct")
                for controller in controllers.split(',') {
                    paths.insert(controller.to_string(), path.to_string());
                }
            }
        }

        Ok(paths)
    }

    /// Build full cgroup filesystem path for a specific controller
    pub fn build_controller_path(&self, controller: &str, cgroup_path: &str) -> PathBuf {
        self.cgroup_root
            .join(controller)
            .join(cgroup_path.trim_start_matches('/'))
    }

    /// Read memory accounting from one memory controller directory
    pub async fn read_from_path(&self, cgroup_path: &str) -> Result<ContainerMemory> {
        let memory_path = self.build_controller_path("memory", cgroup_path);

        let usage_bytes = self.read_value(&memory_path, "memory.usage_in_bytes").await?;
        let limit_bytes = self
            .read_value(&memory_path, "memory.limit_in_bytes")
            .await
            .ok()
            .and_then(Self::normalize_limit);

        let memory_stat_content = fs::read_to_string(memory_path.join("memory.stat"))
            .await
            .unwrap_or_default();
        let memory_stats = parse_memory_stat(&memory_stat_content);

        // Hierarchical total first, then the cgroup-local value
        let inactive_file = memory_stats
            .get("total_inactive_file")
            .or_else(|| memory_stats.get("inactive_file"))
            .copied()
            .unwrap_or(0);

        Ok(ContainerMemory {
            container_id: extract_container_id(cgroup_path),
            cgroup_path: cgroup_path.to_string(),
            usage_bytes,
            working_set_bytes: usage_bytes.saturating_sub(inactive_file),
            limit_bytes,
        })
    }
}

#[async_trait]
impl ContainerMemoryReader for CgroupV1Reader {
    async fn read(&self, pid: u32) -> Result<Option<ContainerMemory>> {
        let paths = self.get_cgroup_paths_for_pid(pid).await?;
        let Some(cgroup_path) = paths.get("memory") else {
            return Ok(None);
        };

        if !self
            .build_controller_path("memory", cgroup_path)
            .join("memory.usage_in_bytes")
            .exists()
        {
            return Ok(None);
        }

        self.read_from_path(cgroup_path).await.map(Some)
    }
}

/// Detect which cgroup version is available on the system
pub async fn detect_cgroup_version(cgroup_root: &Path) -> CgroupVersion {
    // Check for cgroup v2 unified hierarchy
    let v2_controllers = cgroup_root.join("cgroup.controllers");
    if fs::metadata(&v2_controllers).await.is_ok() {
        return CgroupVersion::V2;
    }

    // Check for cgroup v1 controllers
    let v1_memory = cgroup_root.join("memory");
    let v1_cpuacct = cgroup_root.join("cpuacct");
    if fs::metadata(&v1_memory).await.is_ok() && fs::metadata(&v1_cpuacct).await.is_ok() {
        return CgroupVersion::V1;
    }

    CgroupVersion::Unknown
}

/// Cgroup version detected on the system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    V1,
    V2,
    Unknown,
}
