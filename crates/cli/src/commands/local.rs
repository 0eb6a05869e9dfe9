//! Commands that run against the local machine without an agent

use agent_lib::jvm::{
    resolve_from_sources, AttachTransport, DisabledTransport, HotSpotAttachTransport,
    JvmParamResolver, Resolution,
};
use agent_lib::models::NodePressureReport;
use agent_lib::node::{MemoryInfo, SystemPressure};
use agent_lib::process::{self, ProcEnvironment};
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{config_rows, print_pressure, FieldRow};
use crate::output::{color_status, print_json, print_table, print_warning, OutputFormat};

/// Resolve the configuration of a running JVM on this host
pub async fn inspect(
    pid: u32,
    no_attach: bool,
    proc_root: &Path,
    attach_timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    let cmdline = process::read_cmdline(proc_root, pid)
        .with_context(|| format!("Process {} not found or has no command line", pid))?;
    if !process::is_jvm(&cmdline) {
        print_warning(&format!("Process {} does not look like a JVM", pid));
    }

    let transport: Arc<dyn AttachTransport> = if no_attach {
        Arc::new(DisabledTransport)
    } else {
        Arc::new(HotSpotAttachTransport::new(proc_root, attach_timeout))
    };
    let resolver = JvmParamResolver::new(transport, Arc::new(ProcEnvironment::new(proc_root)));

    let cmdline = process::cmdline_to_string(&cmdline);
    let resolution = tokio::task::spawn_blocking(move || resolver.resolve(pid, &cmdline))
        .await
        .context("Resolution task panicked")?;

    print_resolution(Some(pid), &resolution, format)
}

/// Resolve from a command line and environment options given on the command line
pub fn resolve(cmdline: &str, env: &[String], format: OutputFormat) -> Result<()> {
    let env = parse_env_pairs(env)?;
    let resolution = resolve_from_sources(cmdline, &env, None);
    print_resolution(None, &resolution, format)
}

/// Read node pressure from the local procfs
pub async fn pressure(proc_root: &Path, format: OutputFormat) -> Result<()> {
    let pressure = SystemPressure::read(proc_root).await;
    let memory = MemoryInfo::read(proc_root).await.ok();
    let report = NodePressureReport::new("localhost", pressure, memory);
    print_pressure(&report, format)
}

/// Parse `KEY=VALUE` arguments
pub fn parse_env_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .with_context(|| format!("Expected KEY=VALUE, got {:?}", pair))
        })
        .collect()
}

fn print_resolution(pid: Option<u32>, resolution: &Resolution, format: OutputFormat) -> Result<()> {
    if let OutputFormat::Json = format {
        return print_json(&json!({
            "pid": pid,
            "source": resolution.source,
            "attach_error": resolution.attach_error,
            "config": resolution.config,
        }));
    }

    if let Some(pid) = pid {
        println!("{} {}", "JVM".bold(), pid.to_string().cyan());
    }
    let mut rows = vec![FieldRow::new(
        "Source",
        color_status(resolution.source.as_str()),
    )];
    rows.extend(config_rows(&resolution.config));
    print_table(rows, &resolution.config, format)?;

    if let Some(error) = &resolution.attach_error {
        print_warning(&format!("Live attach unavailable: {}", error));
    }
    Ok(())
}
