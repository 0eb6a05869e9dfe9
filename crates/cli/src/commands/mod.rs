//! Subcommand implementations and the renderers they share

pub mod agent;
pub mod local;

use agent_lib::jvm::JvmConfiguration;
use agent_lib::models::NodePressureReport;
use colored::Colorize;
use tabled::Tabled;

use crate::output::{
    color_status, format_bytes, format_initial_heap, format_max_heap, format_timestamp,
    print_json, print_table, OutputFormat,
};

/// Field/value row for detail views
#[derive(Tabled)]
pub(crate) struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl FieldRow {
    pub(crate) fn new(field: &str, value: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }
}

/// Rows describing a resolved configuration
pub(crate) fn config_rows(config: &JvmConfiguration) -> Vec<FieldRow> {
    let mut rows = vec![
        FieldRow::new("Vendor", config.vendor.to_string()),
        FieldRow::new("GC", config.gc_type.to_string()),
        FieldRow::new("Max heap", format_max_heap(config)),
        FieldRow::new("Initial heap", format_initial_heap(config)),
    ];
    if config.min_heap_percentage > 0.0 {
        rows.push(FieldRow::new(
            "Min RAM %",
            format!("{}", config.min_heap_percentage),
        ));
    }
    if !config.raw_extra_flags.is_empty() {
        rows.push(FieldRow::new("-XX flags", config.raw_extra_flags.join(" ")));
    }
    rows
}

#[derive(Tabled)]
struct PressureRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Some avg10")]
    some_avg10: String,
    #[tabled(rename = "Some avg60")]
    some_avg60: String,
    #[tabled(rename = "Full avg10")]
    full_avg10: String,
    #[tabled(rename = "Full avg60")]
    full_avg60: String,
}

pub(crate) fn print_pressure(
    report: &NodePressureReport,
    format: OutputFormat,
) -> anyhow::Result<()> {
    if let OutputFormat::Json = format {
        return print_json(report);
    }

    println!("{}", "Node Pressure".bold());
    println!("{}", "=".repeat(60));
    println!("Node:       {}", report.node_name.cyan());
    println!("Sampled:    {}", format_timestamp(report.timestamp));
    println!(
        "Memory:     {}",
        color_status(report.memory_pressure_level.as_str())
    );
    if let Some(memory) = &report.memory {
        println!(
            "Node RAM:   {} of {} used ({:.1}%)",
            format_bytes((memory.total_bytes - memory.available_bytes).max(0.0) as u64),
            format_bytes(memory.total_bytes as u64),
            memory.used_percent()
        );
    }
    println!();

    let pressure = &report.pressure;
    let rows: Vec<PressureRow> = [
        ("memory", &pressure.memory),
        ("cpu", &pressure.cpu),
        ("io", &pressure.io),
    ]
    .into_iter()
    .map(|(resource, stats)| PressureRow {
        resource: resource.to_string(),
        some_avg10: format!("{:.2}", stats.some.avg10),
        some_avg60: format!("{:.2}", stats.some.avg60),
        full_avg10: format!("{:.2}", stats.full.avg10),
        full_avg60: format!("{:.2}", stats.full.avg60),
    })
    .collect();

    print_table(rows, report, format)
}
