//! Node memory totals from `/proc/meminfo`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_bytes: f64,
    pub available_bytes: f64,
}

impl MemoryInfo {
    pub async fn read(proc_root: &Path) -> Result<Self> {
        let path = proc_root.join("meminfo");
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("No MemTotal in {}", path.display()))
    }

    /// Values in the file are kB
    pub fn parse(content: &str) -> Option<Self> {
        let field = |name: &str| -> Option<f64> {
            content
                .lines()
                .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|kb| kb.parse::<f64>().ok())
                .map(|kb| kb * 1024.0)
        };

        let total_bytes = field("MemTotal")?;
        Some(Self {
            total_bytes,
            available_bytes: field("MemAvailable").unwrap_or(0.0),
        })
    }

    /// Used memory as a percentage of total
    pub fn used_percent(&self) -> f64 {
        if self.total_bytes <= 0.0 {
            return 0.0;
        }
        (self.total_bytes - self.available_bytes) / self.total_bytes * 100.0
    }
}
