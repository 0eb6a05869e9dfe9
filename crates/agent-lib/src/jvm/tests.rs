//! End-to-end resolution tests
//!
//! Exercise the orchestrator with in-memory attach transports and
//! environment snapshots, covering live, merged and fallback resolution.

use super::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn fallback(cmdline: &str, pairs: &[(&str, &str)]) -> JvmConfiguration {
    let resolution = resolve_from_sources(cmdline, &env(pairs), None);
    assert_eq!(resolution.source, ResolutionSource::Fallback);
    resolution.config
}

/// Transport whose dial always fails
struct FailingTransport;

impl AttachTransport for FailingTransport {
    fn dial(&self, pid: u32) -> Result<Box<dyn AttachHandle>, AttachError> {
        Err(AttachError::PermissionDenied {
            pid,
            reason: "test".to_string(),
        })
    }
}

/// Transport serving canned command output
struct MockTransport {
    dump: LiveDump,
    closes: Arc<AtomicUsize>,
}

impl MockTransport {
    fn new(flags: Option<&str>, properties: Option<&str>, version: Option<&str>) -> Self {
        Self {
            dump: LiveDump {
                flags: flags.map(str::to_string),
                system_properties: properties.map(str::to_string),
                version: version.map(str::to_string),
            },
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct MockHandle {
    dump: LiveDump,
    closes: Arc<AtomicUsize>,
}

fn canned(value: &Option<String>, command: &str) -> Result<String, CommandError> {
    value.clone().ok_or_else(|| CommandError::Failed {
        command: command.to_string(),
        status: 1,
        message: "unavailable".to_string(),
    })
}

impl AttachHandle for MockHandle {
    fn flags(&mut self) -> Result<String, CommandError> {
        canned(&self.dump.flags, "VM.flags")
    }

    fn system_properties(&mut self) -> Result<String, CommandError> {
        canned(&self.dump.system_properties, "VM.system_properties")
    }

    fn version(&mut self) -> Result<String, CommandError> {
        canned(&self.dump.version, "VM.version")
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl AttachTransport for MockTransport {
    fn dial(&self, _pid: u32) -> Result<Box<dyn AttachHandle>, AttachError> {
        Ok(Box::new(MockHandle {
            dump: self.dump.clone(),
            closes: self.closes.clone(),
        }))
    }
}

fn resolver(transport: impl AttachTransport + 'static, pairs: &[(&str, &str)]) -> JvmParamResolver {
    JvmParamResolver::new(Arc::new(transport), Arc::new(env(pairs)))
}

#[test]
fn test_resolution_is_deterministic() {
    let cmdline = "java -Xmx1g -XX:MaxRAMPercentage=60 -Xms256m -XX:+UseG1GC -XX:+UseZGC MyApp";
    let pairs = [("JAVA_TOOL_OPTIONS", "-Xmx2g -XX:G1HeapRegionSize=4m")];

    let first = resolve_from_sources(cmdline, &env(&pairs), None);
    let second = resolve_from_sources(cmdline, &env(&pairs), None);
    assert_eq!(first, second);
}

#[test]
fn test_rightmost_wins_across_spellings() {
    assert_eq!(
        fallback("java -Xmx1g -Dfoo=bar -XX:MaxHeapSize=4g MyApp", &[]).max_heap_bytes,
        4.0 * GIB
    );
    assert_eq!(
        fallback("java -XX:MaxHeapSize=4g -Dfoo=bar -Xmx1g MyApp", &[]).max_heap_bytes,
        GIB
    );
}

#[test]
fn test_equivalence_class_merge_for_initial_heap() {
    assert_eq!(
        fallback("java -Xms512m -XX:MinHeapSize=2g MyApp", &[]).initial_heap_bytes,
        2.0 * GIB
    );
    assert_eq!(
        fallback("java -XX:MinHeapSize=2g -Xms512m MyApp", &[]).initial_heap_bytes,
        512.0 * MIB
    );
}

#[test]
fn test_percentage_sentinel_invariant() {
    let config = fallback("java -XX:MaxRAMPercentage=80.0 -jar app.jar", &[]);
    assert_eq!(config.max_heap_bytes, PERCENTAGE_SENTINEL);
    assert_eq!(config.max_heap_percentage, 80.0);
    assert_eq!(config.max_heap(), HeapSetting::Percentage(80.0));
    assert_eq!(config.initial_heap(), HeapSetting::Unset);
}

#[test]
fn test_env_supplies_fields_missing_from_cmdline() {
    let config = fallback(
        "java -Xmx6g MyApp",
        &[("JAVA_TOOL_OPTIONS", "-Xms1g -XX:+UseG1GC")],
    );
    assert_eq!(config.max_heap_bytes, 6.0 * GIB);
    assert_eq!(config.initial_heap_bytes, GIB);
    assert_eq!(config.gc_type, GcType::G1GC);
}

#[test]
fn test_cmdline_overrides_env() {
    let config = fallback(
        "java -Xmx8g -XX:+UseZGC MyApp",
        &[(
            "JAVA_TOOL_OPTIONS",
            "-Xmx2g -Xms512m -XX:+UseG1GC -XX:MaxGCPauseMillis=200",
        )],
    );
    assert_eq!(config.max_heap_bytes, 8.0 * GIB);
    assert_eq!(config.initial_heap_bytes, 512.0 * MIB);
    assert_eq!(config.gc_type, GcType::ZGC);
    assert_eq!(
        config.raw_extra_flags,
        vec!["-XX:+UseG1GC", "-XX:MaxGCPauseMillis=200", "-XX:+UseZGC"]
    );
}

#[test]
fn test_env_precedence_order() {
    let config = fallback(
        "java MyApp",
        &[
            ("IBM_JAVA_OPTIONS", "-Xmx1g -Xms256m -XX:+UseZGC"),
            ("JDK_JAVA_OPTIONS", "-Xmx2g -Xms512m -XX:+UseConcMarkSweepGC"),
            ("_JAVA_OPTIONS", "-Xmx3g -Xms768m -XX:+UseG1GC"),
            ("JAVA_TOOL_OPTIONS", "-Xmx4g -Xms1g -XX:+UseParallelGC"),
        ],
    );
    assert_eq!(config.max_heap_bytes, GIB);
    assert_eq!(config.initial_heap_bytes, 256.0 * MIB);
    assert_eq!(config.gc_type, GcType::ZGC);
    assert_eq!(
        config.raw_extra_flags,
        vec![
            "-XX:+UseParallelGC",
            "-XX:+UseG1GC",
            "-XX:+UseConcMarkSweepGC",
            "-XX:+UseZGC"
        ]
    );
}

#[test]
fn test_fallback_blob_skips_empty_values() {
    let pairs = env(&[
        ("JAVA_TOOL_OPTIONS", ""),
        ("_JAVA_OPTIONS", "-Xmx1g"),
        ("UNRELATED", "-Xmx9g"),
    ]);
    assert_eq!(build_fallback_blob("java MyApp", &pairs), "-Xmx1g java MyApp");
    assert_eq!(build_fallback_blob("", &pairs), "-Xmx1g");
    assert_eq!(build_fallback_blob("", &HashMap::new()), "");
}

#[test]
fn test_spring_boot_style_tool_options() {
    let config = fallback(
        "java -jar app.jar",
        &[(
            "JAVA_TOOL_OPTIONS",
            "-Xms512m -Xmx2g -XX:+UseG1GC -XX:MaxHeapSize=2g -XX:MinHeapSize=512m -XX:+PrintGCDetails",
        )],
    );
    assert_eq!(config.max_heap_bytes, 2.0 * GIB);
    assert_eq!(config.initial_heap_bytes, 512.0 * MIB);
    assert_eq!(config.gc_type, GcType::G1GC);
    assert_eq!(config.raw_extra_flags.len(), 4);
}

#[test]
fn test_gc_last_explicit_flag_wins() {
    let config = fallback("java -XX:+UseSerialGC -XX:+UseParallelGC -XX:+UseG1GC MyApp", &[]);
    assert_eq!(config.gc_type, GcType::G1GC);
}

#[test]
fn test_attach_failure_falls_back() {
    let resolver = resolver(FailingTransport, &[]);
    let resolution = resolver.resolve(4242, "java -Xmx4g -Xms1g -XX:+UseG1GC MyApp");

    assert_eq!(resolution.source, ResolutionSource::Fallback);
    assert!(resolution.attach_error.is_some());
    // Permission problems do not go away on their own
    assert!(!resolution.attach_retryable);

    let config = resolution.config;
    assert_eq!(config.max_heap_bytes, 4.0 * GIB);
    assert_eq!(config.initial_heap_bytes, GIB);
    assert_eq!(config.gc_type, GcType::G1GC);
    assert_eq!(config.vendor, JvmVendor::Unknown);
}

#[test]
fn test_transient_attach_errors() {
    assert!(AttachError::NotAJvm { pid: 1, reason: "starting".to_string() }.is_transient());
    assert!(AttachError::Timeout { pid: 1, timeout_ms: 50 }.is_transient());
    assert!(!AttachError::Disabled.is_transient());
    assert!(!AttachError::ProcessNotFound(1).is_transient());
}

#[test]
fn test_disabled_transport_falls_back() {
    let resolver = resolver(DisabledTransport, &[("JAVA_TOOL_OPTIONS", "-Xmx3g")]);
    let config = resolver.resolve_jvm_params(1, "java MyApp");
    assert_eq!(config.max_heap_bytes, 3.0 * GIB);
}

#[test]
fn test_live_dump_wins_and_handle_is_closed() {
    let transport = MockTransport::new(
        Some("-XX:InitialHeapSize=268435456 -XX:MaxHeapSize=1073741824 -XX:MinHeapSize=8388608 -XX:+UseZGC"),
        Some("java.vm.name=OpenJDK 64-Bit Server VM\njava.vendor=Eclipse Adoptium\n"),
        None,
    );
    let closes = transport.closes.clone();
    let resolver = resolver(transport, &[]);

    let resolution = resolver.resolve(7, "java -Xmx8g -Xms4g -XX:+UseG1GC MyApp");

    assert_eq!(resolution.source, ResolutionSource::Live);
    assert!(resolution.attach_error.is_none());
    assert_eq!(resolution.config.max_heap_bytes, GIB);
    assert_eq!(resolution.config.initial_heap_bytes, 268435456.0);
    assert_eq!(resolution.config.gc_type, GcType::ZGC);
    assert_eq!(resolution.config.vendor, JvmVendor::HotSpot);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_live_dump_fields_filled_from_cmdline() {
    let dump = LiveDump {
        flags: Some("-XX:MaxHeapSize=2147483648".to_string()),
        ..Default::default()
    };
    let resolution = resolve_from_sources(
        "java -Xms512m -XX:+UseParallelGC -XX:MaxRAMPercentage=50 MyApp",
        &HashMap::new(),
        Some(&dump),
    );

    assert_eq!(resolution.source, ResolutionSource::Merged);
    let config = resolution.config;
    assert_eq!(config.max_heap_bytes, 2.0 * GIB);
    assert_eq!(config.initial_heap_bytes, 512.0 * MIB);
    assert_eq!(config.max_heap_percentage, 50.0);
    assert_eq!(config.gc_type, GcType::ParallelGC);
    assert_eq!(config.vendor, JvmVendor::HotSpot);
    assert_eq!(config.raw_extra_flags, vec!["-XX:MaxHeapSize=2147483648"]);
}

#[test]
fn test_live_dump_without_heap_signal_is_insufficient() {
    let transport = MockTransport::new(
        Some("-XX:+UseZGC -XX:CICompilerCount=4"),
        None,
        Some("OpenJDK 64-Bit Server VM version 21.0.2+13"),
    );
    let resolution = resolver(transport, &[]).resolve(9, "java -Xmx1g -XX:+UseG1GC MyApp");

    assert_eq!(resolution.source, ResolutionSource::Fallback);
    assert_eq!(resolution.config.max_heap_bytes, GIB);
    // Collector comes from the fallback pass, vendor from the live pass
    assert_eq!(resolution.config.gc_type, GcType::G1GC);
    assert_eq!(resolution.config.vendor, JvmVendor::HotSpot);
}

#[test]
fn test_failed_flags_command_keeps_vendor() {
    let transport = MockTransport::new(None, Some("java.vm.name=Eclipse OpenJ9 VM\n"), None);
    let resolution = resolver(transport, &[("IBM_JAVA_OPTIONS", "-Xgcpolicy:balanced")])
        .resolve(11, "java -Xmx2g MyApp");

    assert_eq!(resolution.source, ResolutionSource::Fallback);
    assert_eq!(resolution.config.vendor, JvmVendor::OpenJ9);
    assert_eq!(resolution.config.gc_type, GcType::OpenJ9Balanced);
    assert_eq!(resolution.config.max_heap_bytes, 2.0 * GIB);
}

#[test]
fn test_openj9_without_policy_reports_openj9_unknown() {
    let dump = LiveDump {
        version: Some("Eclipse OpenJ9 VM version openj9-0.43.0".to_string()),
        ..Default::default()
    };
    let config = resolve_from_sources("java -Xmx1g MyApp", &HashMap::new(), Some(&dump)).config;
    assert_eq!(config.gc_type, GcType::OpenJ9Unknown);
}

#[test]
fn test_malformed_sizes_do_not_abort_resolution() {
    let config = fallback("java -Xmx2g -Xmx4t -Xms -XX:+UseSerialGC MyApp", &[]);
    assert_eq!(config.max_heap_bytes, 2.0 * GIB);
    assert_eq!(config.initial_heap_bytes, 0.0);
    assert_eq!(config.gc_type, GcType::SerialGC);
}

#[test]
fn test_nothing_configured() {
    let config = fallback("java MyApp", &[]);
    assert_eq!(
        config,
        JvmConfiguration {
            gc_type: GcType::Unknown,
            ..Default::default()
        }
    );
}
