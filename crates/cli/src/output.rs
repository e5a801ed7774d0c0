//! Table rendering for command output

use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::client::{InventoryEntry, MetricListing};

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub fn render_metrics(metrics: &MetricListing) -> String {
    if metrics.is_empty() {
        return "no metrics collected yet".dimmed().to_string();
    }

    let rows: Vec<MetricRow> = metrics
        .iter()
        .map(|(name, metric)| MetricRow {
            name: name.clone(),
            kind: metric.kind.clone(),
            value: metric.value.to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct InventoryRow {
    #[tabled(rename = "Collector")]
    id: String,
    #[tabled(rename = "Last Start")]
    last_run_start: String,
    #[tabled(rename = "Duration")]
    last_run_duration: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub fn render_inventory(entries: &[InventoryEntry]) -> String {
    if entries.is_empty() {
        return "no collectors registered".dimmed().to_string();
    }

    let rows: Vec<InventoryRow> = entries
        .iter()
        .map(|entry| InventoryRow {
            id: entry.id.clone(),
            last_run_start: if entry.last_run_start.is_empty() {
                "never".to_string()
            } else {
                entry.last_run_start.clone()
            },
            last_run_duration: entry.last_run_duration.clone(),
            status: if entry.last_error.is_empty() {
                "ok".green().to_string()
            } else {
                entry.last_error.red().to_string()
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}
