//! Agent configuration

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration, read from `AGENT_*` environment variables
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentConfig {
    /// Node name from the downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics/JVM queries
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// procfs mount, `/host/proc` when running in a container
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,

    #[serde(default = "default_cgroup_root")]
    pub cgroup_root: PathBuf,

    /// Collection interval in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// Attach to JVMs for live flags; off means command line and environment only
    #[serde(default = "default_attach_enabled")]
    pub attach_enabled: bool,

    #[serde(default = "default_attach_timeout_ms")]
    pub attach_timeout_ms: u64,

    /// Retries of a transiently failed attach, spaced 1, 2, 4, ... cycles apart
    #[serde(default = "default_attach_max_retries")]
    pub attach_max_retries: u32,

    /// Ask JVMs started with -XX:+PreserveFramePointer to write a perf map
    #[serde(default)]
    pub perfmap_enabled: bool,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_cgroup_root() -> PathBuf {
    PathBuf::from("/sys/fs/cgroup")
}

fn default_collection_interval() -> u64 {
    30
}

fn default_attach_enabled() -> bool {
    true
}

fn default_attach_timeout_ms() -> u64 {
    5000
}

fn default_attach_max_retries() -> u32 {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            proc_root: default_proc_root(),
            cgroup_root: default_cgroup_root(),
            collection_interval_secs: default_collection_interval(),
            attach_enabled: default_attach_enabled(),
            attach_timeout_ms: default_attach_timeout_ms(),
            attach_max_retries: default_attach_max_retries(),
            perfmap_enabled: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("AGENT").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid agent configuration, using defaults");
            AgentConfig::default()
        }))
    }

    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval_secs)
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.proc_root, PathBuf::from("/proc"));
        assert_eq!(config.cgroup_root, PathBuf::from("/sys/fs/cgroup"));
        assert_eq!(config.collection_interval(), Duration::from_secs(30));
        assert!(config.attach_enabled);
        assert_eq!(config.attach_timeout(), Duration::from_millis(5000));
        assert_eq!(config.attach_max_retries, 5);
        assert!(!config.perfmap_enabled);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AgentConfig =
            serde_json::from_str(r#"{"api_port": 9100, "attach_enabled": false}"#).unwrap();
        assert_eq!(config.api_port, 9100);
        assert!(!config.attach_enabled);
        assert_eq!(config.collection_interval_secs, 30);
    }
}
