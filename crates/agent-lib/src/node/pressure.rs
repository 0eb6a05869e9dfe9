//! Pressure stall information (`/proc/pressure/*`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::fs;

/// Stall averages (percent of wall time) and cumulative stall time
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PressureMetrics {
    pub avg10: f64,
    pub avg60: f64,
    pub avg300: f64,
    /// Microseconds
    pub total: u64,
}

/// `some` and `full` lines of one resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PressureStats {
    pub some: PressureMetrics,
    pub full: PressureMetrics,
}

/// Node-wide pressure for memory, CPU and I/O
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemPressure {
    pub memory: PressureStats,
    pub cpu: PressureStats,
    pub io: PressureStats,
}

/// Coarse memory pressure classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressureLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl MemoryPressureLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryPressureLevel::None => "none",
            MemoryPressureLevel::Low => "low",
            MemoryPressureLevel::Medium => "medium",
            MemoryPressureLevel::High => "high",
            MemoryPressureLevel::Critical => "critical",
        }
    }

    /// Numeric form for gauges (0 = none .. 4 = critical)
    pub fn as_gauge(&self) -> i64 {
        *self as i64
    }
}

impl fmt::Display for MemoryPressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SystemPressure {
    /// Read all three resources. A missing or unreadable file (kernel
    /// without PSI) leaves that resource at zero.
    pub async fn read(proc_root: &Path) -> Self {
        let dir = proc_root.join("pressure");
        Self {
            memory: read_stats(&dir.join("memory")).await.unwrap_or_default(),
            cpu: read_stats(&dir.join("cpu")).await.unwrap_or_default(),
            io: read_stats(&dir.join("io")).await.unwrap_or_default(),
        }
    }

    pub fn is_memory_pressure_high(&self) -> bool {
        let some = &self.memory.some;
        some.avg10 > 10.0 || some.avg60 > 5.0 || some.avg300 > 1.0
    }

    pub fn memory_pressure_level(&self) -> MemoryPressureLevel {
        let some = &self.memory.some;
        let full = &self.memory.full;

        if some.avg10 > 50.0 || full.avg10 > 10.0 {
            MemoryPressureLevel::Critical
        } else if some.avg10 > 20.0 || full.avg10 > 1.0 {
            MemoryPressureLevel::High
        } else if some.avg10 > 10.0 || some.avg60 > 5.0 {
            MemoryPressureLevel::Medium
        } else if some.avg10 > 0.0 || some.avg60 > 0.0 {
            MemoryPressureLevel::Low
        } else {
            MemoryPressureLevel::None
        }
    }
}

async fn read_stats(path: &Path) -> Result<PressureStats> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(parse_pressure(&content))
}

/// Parse the content of one pressure file.
///
/// ```text
/// some avg10=0.00 avg60=0.00 avg300=0.00 total=0
/// full avg10=0.00 avg60=0.00 avg300=0.00 total=0
/// ```
/// Unknown lines and unparseable fields are skipped.
pub fn parse_pressure(content: &str) -> PressureStats {
    let mut stats = PressureStats::default();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }

        let metrics = match parts[0] {
            "some" => &mut stats.some,
            "full" => &mut stats.full,
            _ => continue,
        };

        for field in &parts[1..] {
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };
            match key {
                "avg10" => metrics.avg10 = value.parse().unwrap_or(metrics.avg10),
                "avg60" => metrics.avg60 = value.parse().unwrap_or(metrics.avg60),
                "avg300" => metrics.avg300 = value.parse().unwrap_or(metrics.avg300),
                "total" => metrics.total = value.parse().unwrap_or(metrics.total),
                _ => {}
            }
        }
    }

    stats
}
