//! JVM discovery and container memory collection
//!
//! Finds JVM processes in procfs, reads the memory accounting of the cgroup
//! each one runs in (cgroup v2 unified hierarchy or v1 legacy hierarchy,
//! detected automatically) and drives the periodic resolution loop.

mod cgroup_v1;
mod cgroup_v2;
mod discovery;
mod r#loop;


pub use cgroup_v1::{detect_cgroup_version, CgroupV1Reader, CgroupVersion};
pub use cgroup_v2::CgroupV2Reader;
pub use discovery::{JvmRegistry, ProcfsDiscovery};
pub use r#loop::{CollectionConfig, CollectionLoop, CollectionLoopBuilder, SharedPressure};

use crate::models::{ContainerMemory, JvmProcessInfo};
use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use async_trait::async_trait;

/// Source of JVM processes running on the node
#[async_trait]
pub trait ProcessDiscovery: Send + Sync {
    async fn discover(&self) -> Result<Vec<JvmProcessInfo>>;
}

/// Reads the memory accounting of the cgroup a process belongs to
#[async_trait]
pub trait ContainerMemoryReader: Send + Sync {
    /// `Ok(None)` when the process has no readable memory cgroup
    async fn read(&self, pid: u32) -> Result<Option<ContainerMemory>>;
}

/// Create the memory reader matching the detected cgroup version
pub async fn create_memory_reader(
    cgroup_root: &Path,
    proc_root: impl Into<PathBuf>,
) -> Arc<dyn ContainerMemoryReader> {
    let proc_root = proc_root.into();

    match detect_cgroup_version(cgroup_root).await {
        CgroupVersion::V2 => {
            tracing::info!("Detected cgroup v2, using unified hierarchy reader");
            Arc::new(CgroupV2Reader::with_proc_path(cgroup_root, proc_root))
        }
        CgroupVersion::V1 => {
            tracing::info!("Detected cgroup v1, using legacy hierarchy reader");
            Arc::new(CgroupV1Reader::with_proc_path(cgroup_root, proc_root))
        }
        CgroupVersion::Unknown => {
            tracing::warn!("Could not detect cgroup version, defaulting to v2");
            Arc::new(CgroupV2Reader::with_proc_path(cgroup_root, proc_root))
        }
    }
}

/// Extract a container runtime ID from a cgroup path.
///
/// Handles the common layouts:
/// - Docker: `/docker/<id>` or `docker-<id>.scope`
/// - containerd: `cri-containerd-<id>.scope` or a bare `<id>` component
/// - CRI-O: `crio-<id>.scope` or `crio-<id>`
///
/// Returns `None` for host processes and unrecognised layouts.
pub fn extract_container_id(cgroup_path: &str) -> Option<String> {
    for part in cgroup_path.split('/').rev() {
        let stem = part.strip_suffix(".scope").unwrap_or(part);
        let id = ["cri-containerd-", "crio-", "docker-"]
            .iter()
            .find_map(|prefix| stem.strip_prefix(prefix))
            .unwrap_or(stem);

        if is_container_id(id) {
            return Some(id.to_string());
        }
    }
    None
}

fn is_container_id(id: &str) -> bool {
    id.len() == 64 && id.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse `memory.stat` contents into name/value pairs
pub fn parse_memory_stat(content: &str) -> HashMap<String, u64> {
    let mut stats = HashMap::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 {
            if let Ok(value) = parts[1].parse::<u64>() {
                stats.insert(parts[0].to_string(), value);
            }
        }
    }

    stats
}
