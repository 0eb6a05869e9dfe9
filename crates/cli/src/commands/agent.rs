//! Commands that query a node's JVM agent

use agent_lib::models::JvmSnapshot;
use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use super::{config_rows, print_pressure, FieldRow};
use crate::client::ApiClient;
use crate::output::{
    color_status, format_bytes, format_initial_heap, format_max_heap, format_optional_bytes,
    format_timestamp, print_info, print_json, print_table, print_warning, OutputFormat,
};

/// Row for the JVM list
#[derive(Tabled)]
struct JvmRow {
    #[tabled(rename = "PID")]
    pid: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Vendor")]
    vendor: String,
    #[tabled(rename = "GC")]
    gc: String,
    #[tabled(rename = "Max Heap")]
    max_heap: String,
    #[tabled(rename = "Initial Heap")]
    initial_heap: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Mem Limit")]
    memory_limit: String,
}

impl From<&JvmSnapshot> for JvmRow {
    fn from(jvm: &JvmSnapshot) -> Self {
        Self {
            pid: jvm.pid,
            name: jvm.process_name.clone(),
            vendor: jvm.config.vendor.to_string(),
            gc: jvm.config.gc_type.to_string(),
            max_heap: format_max_heap(&jvm.config),
            initial_heap: format_initial_heap(&jvm.config),
            source: color_status(jvm.source.as_str()),
            memory_limit: jvm
                .container
                .as_ref()
                .map(|c| format_optional_bytes(c.limit_bytes))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Row for OOM kill history
#[derive(Tabled)]
struct OomRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "PID")]
    pid: u32,
    #[tabled(rename = "Process")]
    process: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Pressure")]
    pressure: String,
    #[tabled(rename = "Node Mem")]
    node_memory: String,
    #[tabled(rename = "Usage / Limit")]
    container_memory: String,
}

/// List monitored JVMs
pub async fn list(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let jvms = client.list_jvms().await?;
    let rows: Vec<JvmRow> = jvms.iter().map(JvmRow::from).collect();
    print_table(rows, &jvms, format)?;

    if let OutputFormat::Table = format {
        if !jvms.is_empty() {
            println!("\nTotal: {} JVMs", jvms.len());
        }
    }
    Ok(())
}

/// Show one monitored JVM in detail
pub async fn show(client: &ApiClient, pid: u32, format: OutputFormat) -> Result<()> {
    let jvm = client.get_jvm(pid).await?;

    if let OutputFormat::Json = format {
        return print_json(&jvm);
    }

    println!("{}", "JVM Details".bold());
    println!("{}", "=".repeat(60));
    println!("PID:        {}", jvm.pid.to_string().cyan());
    println!("Process:    {}", jvm.process_name);
    println!("Node:       {}", jvm.node_name);
    println!("First seen: {}", format_timestamp(jvm.first_seen));
    println!("Command:    {}", jvm.cmdline.dimmed());
    println!();

    let mut rows = vec![FieldRow::new("Source", color_status(jvm.source.as_str()))];
    rows.extend(config_rows(&jvm.config));
    if let Some(container) = &jvm.container {
        if let Some(id) = &container.container_id {
            rows.push(FieldRow::new("Container", id.chars().take(12).collect::<String>()));
        }
        rows.push(FieldRow::new("Mem usage", format_bytes(container.usage_bytes)));
        rows.push(FieldRow::new("Working set", format_bytes(container.working_set_bytes)));
        rows.push(FieldRow::new("Mem limit", format_optional_bytes(container.limit_bytes)));
    }
    rows.push(FieldRow::new(
        "Perf map",
        if jvm.perfmap_supported { "supported" } else { "unsupported" },
    ));
    print_table(rows, &jvm, format)?;

    if let Some(error) = &jvm.attach_error {
        print_warning(&format!("Live attach unavailable: {}", error));
    }
    Ok(())
}

/// Node pressure as last sampled by the agent
pub async fn pressure(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report = client.pressure().await?;
    print_pressure(&report, format)
}

/// Recent OOM kills of monitored JVMs
pub async fn ooms(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let contexts = client.ooms().await?;

    if contexts.is_empty() {
        if let OutputFormat::Table = format {
            print_info("No OOM kills recorded");
            return Ok(());
        }
    }

    let rows: Vec<OomRow> = contexts
        .iter()
        .map(|c| OomRow {
            time: c.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            pid: c.pid,
            process: c.process_name.clone(),
            container: if c.container_name.is_empty() {
                "-".to_string()
            } else {
                c.container_name.chars().take(12).collect()
            },
            pressure: color_status(c.memory_pressure.as_str()),
            node_memory: format!("{:.1}%", c.node_memory_usage),
            container_memory: format!(
                "{} / {}",
                format_bytes(c.container_mem_usage),
                format_bytes(c.container_mem_limit)
            ),
        })
        .collect();

    print_table(rows, &contexts, format)
}
