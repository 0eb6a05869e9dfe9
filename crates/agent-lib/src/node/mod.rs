//! Node-level memory signals

pub mod meminfo;
pub mod pressure;

pub use meminfo::MemoryInfo;
pub use pressure::{
    parse_pressure, MemoryPressureLevel, PressureMetrics, PressureStats, SystemPressure,
};
