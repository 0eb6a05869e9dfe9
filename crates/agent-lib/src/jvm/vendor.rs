//! JVM vendor detection
//!
//! Classifies the implementation family from the most trustworthy text
//! available: system properties, then the version banner, then the live flag
//! dump. Detection never fails; with no usable signal the vendor is
//! [`JvmVendor::Unknown`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// JVM implementation family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JvmVendor {
    #[default]
    Unknown,
    HotSpot,
    OpenJ9,
    GraalVM,
}

impl JvmVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            JvmVendor::Unknown => "Unknown",
            JvmVendor::HotSpot => "HotSpot",
            JvmVendor::OpenJ9 => "OpenJ9",
            JvmVendor::GraalVM => "GraalVM",
        }
    }
}

impl fmt::Display for JvmVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Property keys inspected, most specific first
const VENDOR_PROPERTY_KEYS: &[&str] = &[
    "java.vm.name",
    "java.vm.vendor",
    "java.vendor",
    "java.vendor.version",
];

/// Detect the vendor from whatever introspection output was obtainable
pub fn detect_vendor(
    system_properties: Option<&str>,
    version: Option<&str>,
    flags: Option<&str>,
) -> JvmVendor {
    system_properties
        .and_then(vendor_from_properties)
        .or_else(|| version.and_then(classify_text))
        .or_else(|| flags.and_then(vendor_from_flags))
        .unwrap_or_default()
}

/// Substring rules shared by every source, checked in priority order
fn classify_text(text: &str) -> Option<JvmVendor> {
    let text = text.to_ascii_lowercase();
    let has_any = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if has_any(&["openj9", "eclipse", "ibm"]) {
        Some(JvmVendor::OpenJ9)
    } else if has_any(&["graalvm"]) {
        Some(JvmVendor::GraalVM)
    } else if has_any(&["hotspot", "openjdk"]) {
        Some(JvmVendor::HotSpot)
    } else {
        None
    }
}

/// GraalVM builds report a HotSpot `java.vm.name`, so any GraalVM mention
/// among the vendor keys takes priority. Otherwise keys are tried in order,
/// which keeps HotSpot distributions from an "Eclipse" vendor (Temurin)
/// classified by their VM name.
fn vendor_from_properties(properties: &str) -> Option<JvmVendor> {
    let values: Vec<&str> = VENDOR_PROPERTY_KEYS
        .iter()
        .filter_map(|key| property_value(properties, key))
        .collect();

    if values
        .iter()
        .any(|v| v.to_ascii_lowercase().contains("graalvm"))
    {
        return Some(JvmVendor::GraalVM);
    }

    values.into_iter().find_map(classify_text)
}

fn vendor_from_flags(flags: &str) -> Option<JvmVendor> {
    classify_text(flags).or_else(|| {
        let hotspot_shaped = flags
            .split_whitespace()
            .any(|t| t.starts_with("-XX:MaxHeapSize=") || t.starts_with("-XX:InitialHeapSize="));
        hotspot_shaped.then_some(JvmVendor::HotSpot)
    })
}

/// Look up `key=value` (or `key: value`) in properties output.
///
/// `VM.system_properties` escapes some characters with backslashes; values
/// are only substring-matched here so they are returned raw.
fn property_value<'a>(properties: &'a str, key: &str) -> Option<&'a str> {
    properties.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(key)?;
        let rest = rest.trim_start();
        rest.strip_prefix('=')
            .or_else(|| rest.strip_prefix(':'))
            .map(str::trim)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOTSPOT_PROPS: &str = "#Thu Oct 19 10:00:00 UTC 2026\n\
        java.vm.vendor=Eclipse Adoptium\n\
        java.vendor=Eclipse Adoptium\n\
        java.vm.name=OpenJDK 64-Bit Server VM\n\
        java.version=17.0.8\n";

    const OPENJ9_PROPS: &str = "java.vm.name=Eclipse OpenJ9 VM\njava.vendor=IBM Corporation\n";

    const GRAAL_PROPS: &str = "java.vm.name=OpenJDK 64-Bit Server VM\n\
        java.vendor=GraalVM Community\n\
        java.vendor.version=GraalVM CE 21.0.1+12.1\n";

    #[test]
    fn test_properties_take_priority() {
        assert_eq!(
            detect_vendor(Some(OPENJ9_PROPS), Some("OpenJDK 64-Bit Server VM"), None),
            JvmVendor::OpenJ9
        );
    }

    #[test]
    fn test_temurin_is_hotspot() {
        assert_eq!(detect_vendor(Some(HOTSPOT_PROPS), None, None), JvmVendor::HotSpot);
    }

    #[test]
    fn test_graalvm_from_properties() {
        assert_eq!(detect_vendor(Some(GRAAL_PROPS), None, None), JvmVendor::GraalVM);
    }

    #[test]
    fn test_version_used_when_properties_missing_or_silent() {
        assert_eq!(
            detect_vendor(None, Some("12345:\nEclipse OpenJ9 VM version openj9-0.40.0"), None),
            JvmVendor::OpenJ9
        );
        assert_eq!(
            detect_vendor(
                Some("user.dir=/app\n"),
                Some("OpenJDK 64-Bit Server VM version 17.0.8+7\nJDK 17.0.8"),
                None
            ),
            JvmVendor::HotSpot
        );
    }

    #[test]
    fn test_flags_fallback_to_hotspot_shape() {
        assert_eq!(
            detect_vendor(None, None, Some("-XX:MaxHeapSize=1073741824 -XX:+UseG1GC")),
            JvmVendor::HotSpot
        );
        assert_eq!(
            detect_vendor(None, None, Some("-XX:InitialHeapSize=268435456")),
            JvmVendor::HotSpot
        );
    }

    #[test]
    fn test_no_signal_is_unknown() {
        assert_eq!(detect_vendor(None, None, None), JvmVendor::Unknown);
        assert_eq!(
            detect_vendor(Some(""), Some("banner"), Some("-XX:+UseG1GC")),
            JvmVendor::Unknown
        );
    }

    #[test]
    fn test_property_value_parsing() {
        assert_eq!(
            property_value(HOTSPOT_PROPS, "java.vm.name"),
            Some("OpenJDK 64-Bit Server VM")
        );
        assert_eq!(property_value("java.vendor: IBM", "java.vendor"), Some("IBM"));
        assert_eq!(property_value(HOTSPOT_PROPS, "java.home"), None);
    }
}
