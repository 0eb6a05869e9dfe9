//! cgroup v2 memory accounting
//!
//! Reads from the unified hierarchy:
//! - memory.current for current usage
//! - memory.max for the limit (`max` means unlimited)
//! - memory.stat for the working set estimate

use super::{async_trait, extract_container_id, parse_memory_stat, ContainerMemoryReader};
use crate::models::ContainerMemory;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Memory reader for the cgroup v2 unified hierarchy
pub struct CgroupV2Reader {
    cgroup_root: PathBuf,
    proc_path: PathBuf,
}

impl CgroupV2Reader {
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

    /// Check if cgroup v2 is available on this system
    pub async fn is_available(&self) -> bool {
        fs::metadata(self.cgroup_root.join("cgroup.controllers"))
            .await
            .is_ok()
    }

    /// Parse `memory.max`; `max` means no limit
    pub fn parse_memory_max(content: &str) -> Result<Option<u64>> {
        match content.trim() {
            "max" => Ok(None),
            value => value
                .parse()
                .map(Some)
                .with_context(|| format!("Failed to parse memory.max value {:?}", value)),
        }
    }

    async fn read_cgroup_value(&self, cgroup_path: &Path, filename: &str) -> Result<u64> {
        let file_path = cgroup_path.join(filename);
        let content = fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("Failed to read {}", file_path.display()))?;

        content
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {} value", filename))
    }

    /// Parse /proc/{pid}/cgroup to get cgroup path for a process
    pub async fn get_cgroup_path_for_pid(&self, pid: u32) -> Result<String> {
        let cgroup_file = self.proc_path.join(format!("{}/cgroup", pid));
        let content = fs::read_to_string(&cgroup_file)
            .await
            .with_context(|| format!("Failed to read cgroup for pid {}", pid))?;

        // cgroup v2 format: "0::/path/to/cgroup"
        for line in content.lines() {
            let parts: Vec<&str> = line.splitn(3, ':').collect();
            if parts.len() == 3 && parts[0] == "0" {
                return Ok(parts[2].to_string());
            }
        }

        anyhow::bail!("No cgroup v2 path found for pid {}", pid)
    }

    /// Build full cgroup filesystem path from relative cgroup path
    pub fn build_cgroup_fs_path(&self, cgroup_path: &str) -> PathBuf {
        self.cgroup_root.join(cgroup_path.trim_start_matches('/'))
    }

    /// Read memory accounting from one cgroup directory
    pub async fn read_from_path(&self, cgroup_path: &str) -> Result<ContainerMemory> {
        let fs_path = self.build_cgroup_fs_path(cgroup_path);

        let usage_bytes = self.read_cgroup_value(&fs_path, "memory.current").await?;

        let limit_bytes = match fs::read_to_string(fs_path.join("memory.max")).await {
            Ok(content) => Self::parse_memory_max(&content)?,
            Err(_) => None,
        };

        let memory_stat_content = fs::read_to_string(fs_path.join("memory.stat"))
            .await
            .unwrap_or_default();
        let inactive_file = parse_memory_stat(&memory_stat_content)
            .get("inactive_file")
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
impl ContainerMemoryReader for CgroupV2Reader {
    async fn read(&self, pid: u32) -> Result<Option<ContainerMemory>> {
        let cgroup_path = self.get_cgroup_path_for_pid(pid).await?;

        // The root cgroup has no memory.current
        if !self
            .build_cgroup_fs_path(&cgroup_path)
            .join("memory.current")
            .exists()
        {
            return Ok(None);
        }

        self.read_from_path(&cgroup_path).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_max() {
        assert_eq!(CgroupV2Reader::parse_memory_max("max\n").unwrap(), None);
        assert_eq!(
            CgroupV2Reader::parse_memory_max("536870912\n").unwrap(),
            Some(536870912)
        );
        assert!(CgroupV2Reader::parse_memory_max("lots").is_err());
    }

    #[test]
    fn test_build_cgroup_fs_path() {
        let reader = CgroupV2Reader::new("/sys/fs/cgroup");
        assert_eq!(
            reader.build_cgroup_fs_path("/kubepods.slice/pod.slice"),
            PathBuf::from("/sys/fs/cgroup/kubepods.slice/pod.slice")
        );
    }

    #[tokio::test]
    async fn test_get_cgroup_path_for_pid() {
        let proc = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(proc.path().join("7")).await.unwrap();
        fs::write(proc.path().join("7/cgroup"), "0::/system.slice/app.service\n")
            .await
            .unwrap();

        let reader = CgroupV2Reader::with_proc_path("/sys/fs/cgroup", proc.path());
        assert_eq!(
            reader.get_cgroup_path_for_pid(7).await.unwrap(),
            "/system.slice/app.service"
        );
        assert!(reader.get_cgroup_path_for_pid(8).await.is_err());
    }
}
