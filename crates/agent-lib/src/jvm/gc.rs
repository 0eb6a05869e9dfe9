//! Garbage collector classification
//!
//! HotSpot-family JVMs select a collector with `-XX:+Use<Name>GC`; OpenJ9
//! uses `-Xgcpolicy:<name>`. Which grammar applies is decided by the
//! [`FlagDialect`] derived from the detected vendor.

use super::flags::last_value;
use super::vendor::JvmVendor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Garbage collector family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GcType {
    G1GC,
    ParallelGC,
    ParallelOldGC,
    SerialGC,
    ZGC,
    ShenandoahGC,
    ConcMarkSweepGC,
    OpenJ9Gencon,
    OpenJ9Throughput,
    OpenJ9AvgPause,
    OpenJ9Balanced,
    /// OpenJ9 JVM whose policy could not be determined
    OpenJ9Unknown,
    #[default]
    Unknown,
}

impl GcType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GcType::G1GC => "G1GC",
            GcType::ParallelGC => "ParallelGC",
            GcType::ParallelOldGC => "ParallelOldGC",
            GcType::SerialGC => "SerialGC",
            GcType::ZGC => "ZGC",
            GcType::ShenandoahGC => "ShenandoahGC",
            GcType::ConcMarkSweepGC => "ConcMarkSweepGC",
            GcType::OpenJ9Gencon => "OpenJ9Gencon",
            GcType::OpenJ9Throughput => "OpenJ9Throughput",
            GcType::OpenJ9AvgPause => "OpenJ9AvgPause",
            GcType::OpenJ9Balanced => "OpenJ9Balanced",
            GcType::OpenJ9Unknown => "OpenJ9Unknown",
            GcType::Unknown => "Unknown",
        }
    }

    /// True for both the HotSpot and the OpenJ9 flavour of "unknown"
    pub fn is_unknown(&self) -> bool {
        matches!(self, GcType::Unknown | GcType::OpenJ9Unknown)
    }
}

impl fmt::Display for GcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flag grammar used to interpret a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagDialect {
    /// HotSpot, GraalVM, and the default for unknown vendors
    HotSpot,
    OpenJ9,
}

impl FlagDialect {
    pub fn for_vendor(vendor: JvmVendor) -> Self {
        match vendor {
            JvmVendor::OpenJ9 => FlagDialect::OpenJ9,
            JvmVendor::HotSpot | JvmVendor::GraalVM | JvmVendor::Unknown => FlagDialect::HotSpot,
        }
    }
}

/// Explicit enable flags, matched exactly
const EXPLICIT_GC_FLAGS: &[(&str, GcType)] = &[
    ("-XX:+UseG1GC", GcType::G1GC),
    ("-XX:+UseParallelGC", GcType::ParallelGC),
    ("-XX:+UseParallelOldGC", GcType::ParallelOldGC),
    ("-XX:+UseSerialGC", GcType::SerialGC),
    ("-XX:+UseZGC", GcType::ZGC),
    ("-XX:+UseShenandoahGC", GcType::ShenandoahGC),
    ("-XX:+UseConcMarkSweepGC", GcType::ConcMarkSweepGC),
];

const OPENJ9_POLICIES: &[(&str, GcType)] = &[
    ("gencon", GcType::OpenJ9Gencon),
    ("optthruput", GcType::OpenJ9Throughput),
    ("optavgpause", GcType::OpenJ9AvgPause),
    ("balanced", GcType::OpenJ9Balanced),
];

/// Classify the collector.
///
/// `blob` is the full text the flags came from (needed for `-Xgcpolicy:`),
/// `xx_flags` the `-XX:` tokens already extracted from it.
pub fn classify_gc(dialect: FlagDialect, blob: &str, xx_flags: &[String]) -> GcType {
    match dialect {
        FlagDialect::HotSpot => classify_hotspot(xx_flags),
        FlagDialect::OpenJ9 => classify_openj9(blob),
    }
}

/// Like [`classify_gc`], but for an unidentified vendor an `-Xgcpolicy:`
/// token is honoured when the HotSpot rules find nothing.
pub fn classify_gc_for_vendor(vendor: JvmVendor, blob: &str, xx_flags: &[String]) -> GcType {
    let gc = classify_gc(FlagDialect::for_vendor(vendor), blob, xx_flags);

    if vendor == JvmVendor::Unknown
        && gc == GcType::Unknown
        && last_value(blob, "-Xgcpolicy:").is_some()
    {
        return classify_openj9(blob);
    }
    gc
}

fn classify_hotspot(xx_flags: &[String]) -> GcType {
    let explicit = xx_flags.iter().rev().find_map(|flag| {
        EXPLICIT_GC_FLAGS
            .iter()
            .find(|(name, _)| flag == name)
            .map(|(_, gc)| *gc)
    });

    explicit.unwrap_or_else(|| infer_hotspot(xx_flags))
}

/// Fallback when no collector was explicitly enabled: tuning flags usually
/// name the collector they belong to.
fn infer_hotspot(xx_flags: &[String]) -> GcType {
    let any = |pred: &dyn Fn(&str) -> bool| xx_flags.iter().any(|f| pred(f));

    if any(&|f| f.contains("G1")) {
        GcType::G1GC
    } else if any(&|f| f.contains("Parallel") && !f.starts_with("-XX:-UseParallel")) {
        GcType::ParallelGC
    } else if any(&|f| f.contains("ConcMarkSweep") || f.contains("CMS")) {
        GcType::ConcMarkSweepGC
    } else if any(&|f| f.contains("Serial") && !f.starts_with("-XX:-UseSerial")) {
        GcType::SerialGC
    } else {
        GcType::Unknown
    }
}

fn classify_openj9(blob: &str) -> GcType {
    last_value(blob, "-Xgcpolicy:")
        .and_then(|policy| {
            OPENJ9_POLICIES
                .iter()
                .find(|(name, _)| policy.eq_ignore_ascii_case(name))
                .map(|(_, gc)| *gc)
        })
        .unwrap_or(GcType::OpenJ9Unknown)
}
