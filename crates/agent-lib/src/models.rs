//! Core data models for the JVM agent

use crate::jvm::{JvmConfiguration, ResolutionSource};
use crate::node::{MemoryInfo, MemoryPressureLevel, SystemPressure};
use serde::{Deserialize, Serialize};

/// A JVM process found on the node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JvmProcessInfo {
    pub pid: u32,
    pub process_name: String,
    /// argv joined with spaces
    pub cmdline: String,
    pub perfmap_supported: bool,
}

/// Memory accounting of the cgroup a process runs in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerMemory {
    /// 64-character runtime ID, absent for processes outside a container
    pub container_id: Option<String>,
    pub cgroup_path: String,
    pub usage_bytes: u64,
    pub working_set_bytes: u64,
    /// `None` when the cgroup is unlimited
    pub limit_bytes: Option<u64>,
}

/// Latest resolved state of one JVM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JvmSnapshot {
    pub pid: u32,
    pub process_name: String,
    pub node_name: String,
    pub cmdline: String,
    pub config: JvmConfiguration,
    pub source: ResolutionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerMemory>,
    pub perfmap_supported: bool,
    pub first_seen: i64,
    pub last_updated: i64,
}

impl JvmSnapshot {
    /// Container ID, or an empty string for host processes
    pub fn container_id(&self) -> &str {
        self.container
            .as_ref()
            .and_then(|c| c.container_id.as_deref())
            .unwrap_or_default()
    }
}

/// Node memory pressure as served by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePressureReport {
    pub node_name: String,
    pub timestamp: i64,
    pub pressure: SystemPressure,
    pub memory_pressure_level: MemoryPressureLevel,
    pub memory_pressure_high: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryInfo>,
}

impl NodePressureReport {
    pub fn new(
        node_name: impl Into<String>,
        pressure: SystemPressure,
        memory: Option<MemoryInfo>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            timestamp: chrono::Utc::now().timestamp(),
            memory_pressure_level: pressure.memory_pressure_level(),
            memory_pressure_high: pressure.is_memory_pressure_high(),
            pressure,
            memory,
        }
    }

    pub fn memory_used_percent(&self) -> Option<f64> {
        self.memory.as_ref().map(MemoryInfo::used_percent)
    }
}
