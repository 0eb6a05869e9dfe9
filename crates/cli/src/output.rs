//! Output formatting utilities

use agent_lib::jvm::{HeapSetting, JvmConfiguration};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a table, or `json_value` as JSON
pub fn print_table<T: Tabled, J: Serialize + ?Sized>(
    rows: Vec<T>,
    json_value: &J,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No items found".yellow());
                return Ok(());
            }
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(json_value)?,
    }
    Ok(())
}

pub fn print_json<J: Serialize + ?Sized>(value: &J) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2}Gi", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}Mi", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}Ki", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Render one heap kind: absolute size, percentage of RAM, or `-`
pub fn format_heap(setting: HeapSetting) -> String {
    match setting {
        HeapSetting::Bytes(bytes) => format_bytes(bytes as u64),
        HeapSetting::Percentage(pct) => format!("{}% of RAM", pct),
        HeapSetting::Unset => "-".to_string(),
    }
}

pub fn format_max_heap(config: &JvmConfiguration) -> String {
    format_heap(config.max_heap())
}

pub fn format_initial_heap(config: &JvmConfiguration) -> String {
    format_heap(config.initial_heap())
}

pub fn format_optional_bytes(bytes: Option<u64>) -> String {
    bytes.map(format_bytes).unwrap_or_else(|| "unlimited".to_string())
}

pub fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Color a resolution source, pressure level or health status
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "live" | "none" | "healthy" => status.green().to_string(),
        "merged" | "low" => status.blue().to_string(),
        "fallback" | "medium" | "degraded" => status.yellow().to_string(),
        "high" | "critical" | "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}
