//! Configuration orchestration
//!
//! Combines an optional live flag dump with the environment and command
//! line of a process. The live dump is preferred; anything it leaves unset
//! is filled from a fallback pass over the environment options and command
//! line, concatenated in the order the JVM launcher itself applies them.

use super::attach::{AttachError, AttachHandle, AttachTransport};
use super::config::JvmConfiguration;
use super::flags::extract_xx_flags;
use super::gc::classify_gc_for_vendor;
use super::precedence::{resolve_heap_settings, SourceKind};
use super::vendor::{detect_vendor, JvmVendor};
use crate::process::EnvironmentSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Environment variables the launcher prepends to the command line, in
/// application order. Later entries, and the command line itself, override
/// earlier ones.
pub const ENV_PRECEDENCE: [&str; 4] = [
    "JAVA_TOOL_OPTIONS",
    "_JAVA_OPTIONS",
    "JDK_JAVA_OPTIONS",
    "IBM_JAVA_OPTIONS",
];

/// Raw introspection output obtained from a live JVM. Each command may
/// have failed independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveDump {
    pub flags: Option<String>,
    pub system_properties: Option<String>,
    pub version: Option<String>,
}

impl LiveDump {
    /// Run every introspection command, then close the handle
    pub fn collect(handle: &mut dyn AttachHandle) -> Self {
        let dump = Self {
            flags: handle.flags().ok(),
            system_properties: handle.system_properties().ok(),
            version: handle.version().ok(),
        };
        handle.close();
        dump
    }
}

/// Which sources produced the final record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    /// Live dump alone
    Live,
    /// Live dump with fields filled from environment and command line
    Merged,
    /// Environment and command line only
    Fallback,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::Live => "live",
            ResolutionSource::Merged => "merged",
            ResolutionSource::Fallback => "fallback",
        }
    }
}

/// A resolved configuration plus how it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub config: JvmConfiguration,
    pub source: ResolutionSource,
    /// Why the live dump was unavailable, for callers that log degradation
    pub attach_error: Option<String>,
    /// The attach failure may clear up on a later attempt
    pub attach_retryable: bool,
}

/// Concatenate non-empty environment options and the command line
pub fn build_fallback_blob(cmdline: &str, env: &HashMap<String, String>) -> String {
    ENV_PRECEDENCE
        .iter()
        .filter_map(|key| env.get(*key))
        .map(String::as_str)
        .chain(std::iter::once(cmdline))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run the full parsing pipeline over one blob
pub fn resolve_blob(blob: &str, source: SourceKind, vendor: JvmVendor) -> JvmConfiguration {
    let raw_extra_flags = extract_xx_flags(blob);
    let mut config = JvmConfiguration {
        gc_type: classify_gc_for_vendor(vendor, blob, &raw_extra_flags),
        vendor,
        raw_extra_flags,
        ..Default::default()
    };
    config.apply_heap_settings(&resolve_heap_settings(blob, source));
    config
}

/// Resolve from already-gathered inputs. Pure and total.
pub fn resolve_from_sources(
    cmdline: &str,
    env: &HashMap<String, String>,
    live: Option<&LiveDump>,
) -> Resolution {
    let vendor = live.map_or(JvmVendor::Unknown, |dump| {
        detect_vendor(
            dump.system_properties.as_deref(),
            dump.version.as_deref(),
            dump.flags.as_deref(),
        )
    });

    let live_config = live
        .and_then(|dump| dump.flags.as_deref())
        .map(|flags| resolve_blob(flags, SourceKind::LiveDump, vendor))
        .filter(JvmConfiguration::has_heap_signal);

    let fallback = resolve_blob(
        &build_fallback_blob(cmdline, env),
        SourceKind::CommandLine,
        vendor,
    );

    let (config, source) = match live_config {
        Some(live) => {
            let mut merged = live.clone();
            merged.fill_unset_from(&fallback);
            let source = if merged == live {
                ResolutionSource::Live
            } else {
                ResolutionSource::Merged
            };
            (merged, source)
        }
        None => (fallback, ResolutionSource::Fallback),
    };

    Resolution {
        config,
        source,
        attach_error: None,
        attach_retryable: false,
    }
}

/// Engine entry point bound to an attach transport and environment source
#[derive(Clone)]
pub struct JvmParamResolver {
    transport: Arc<dyn AttachTransport>,
    environment: Arc<dyn EnvironmentSource>,
}

impl JvmParamResolver {
    pub fn new(
        transport: Arc<dyn AttachTransport>,
        environment: Arc<dyn EnvironmentSource>,
    ) -> Self {
        Self {
            transport,
            environment,
        }
    }

    /// Resolve the configuration of `pid`. Never fails; unresolvable fields
    /// stay at their zero value.
    pub fn resolve_jvm_params(&self, pid: u32, cmdline: &str) -> JvmConfiguration {
        self.resolve(pid, cmdline).config
    }

    /// Like [`Self::resolve_jvm_params`] but also reports provenance
    pub fn resolve(&self, pid: u32, cmdline: &str) -> Resolution {
        let env = self.environment.environment(pid);

        match self.fetch_live(pid) {
            Ok(dump) => resolve_from_sources(cmdline, &env, Some(&dump)),
            Err(e) => Resolution {
                attach_error: Some(e.to_string()),
                attach_retryable: e.is_transient(),
                ..resolve_from_sources(cmdline, &env, None)
            },
        }
    }

    /// Ask a live JVM to write its perf map
    pub fn dump_perfmap(&self, pid: u32) -> anyhow::Result<()> {
        let mut handle = self.transport.dial(pid)?;
        let result = handle.dump_perfmap();
        handle.close();
        result?;
        Ok(())
    }

    fn fetch_live(&self, pid: u32) -> Result<LiveDump, AttachError> {
        let mut handle = self.transport.dial(pid)?;
        Ok(LiveDump::collect(handle.as_mut()))
    }
}

impl std::fmt::Debug for JvmParamResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JvmParamResolver").finish_non_exhaustive()
    }
}
