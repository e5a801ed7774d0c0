//! CPU collector
//!
//! Reads `/proc/stat`: aggregate jiffy counters per mode, context switches,
//! fork count, and the running/blocked process gauges. Per-cpu lines are
//! reported when enabled in settings, with the cpu index carried as a stream
//! tag.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{async_trait, Collector, CollectorError, InventoryRecord, MetricBatch, RunCore};
use crate::activation::MetricActivation;
use crate::metrics::{Metric, MetricSet};
use crate::settings::{load_collector_settings, CommonSettings};
use crate::tags::Tag;

pub const ID: &str = "cpu";

const STAT_MODES: [&str; 8] = [
    "user", "nice", "system", "idle", "iowait", "irq", "softirq", "steal",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CpuSettings {
    #[serde(flatten)]
    pub common: CommonSettings,
    /// Report each cpu line in addition to the aggregate.
    pub report_per_cpu: bool,
}

pub struct CpuCollector {
    core: RunCore,
    activation: MetricActivation,
    report_per_cpu: bool,
    stat_path: PathBuf,
}

impl CpuCollector {
    /// Builds the collector from `<config_dir>/cpu.<ext>`; a missing file
    /// yields defaults.
    pub fn from_config(config_dir: &Path) -> Result<Self> {
        let settings: CpuSettings = load_collector_settings(config_dir, ID)?;
        Ok(Self::new(settings))
    }

    pub fn new(settings: CpuSettings) -> Self {
        Self {
            core: RunCore::new(ID, settings.common.run_ttl()),
            activation: settings.common.activation(),
            report_per_cpu: settings.report_per_cpu,
            stat_path: PathBuf::from("/proc/stat"),
        }
    }

    async fn gather(&self, token: &CancellationToken) -> Result<MetricSet, CollectorError> {
        #[cfg(not(target_os = "linux"))]
        {
            let _ = token;
            Err(CollectorError::NotImplemented)
        }

        #[cfg(target_os = "linux")]
        {
            let content = tokio::select! {
                read = tokio::fs::read_to_string(&self.stat_path) => read
                    .with_context(|| format!("failed to read {}", self.stat_path.display()))?,
                _ = token.cancelled() => return Err(CollectorError::Cancelled),
            };

            let mut batch = MetricBatch::new(ID, &self.activation);
            parse_stat(&content, self.report_per_cpu, &mut batch);
            Ok(batch.into_set())
        }
    }
}

/// Parses `/proc/stat` content into the batch.
fn parse_stat(content: &str, report_per_cpu: bool, batch: &mut MetricBatch<'_>) {
    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else { continue };

        match label {
            "cpu" => {
                for (mode, raw) in STAT_MODES.iter().zip(fields) {
                    if let Ok(value) = raw.parse::<u64>() {
                        batch.add(mode, &[], Metric::uint64(value));
                    }
                }
            }
            _ if label.starts_with("cpu") => {
                if !report_per_cpu {
                    continue;
                }
                let index = &label[3..];
                let tags = [Tag::new("cpu", index)];
                for (mode, raw) in STAT_MODES.iter().zip(fields) {
                    if let Ok(value) = raw.parse::<u64>() {
                        batch.add(mode, &tags, Metric::uint64(value));
                    }
                }
            }
            "ctxt" | "processes" => {
                if let Some(Ok(value)) = fields.next().map(str::parse::<u64>) {
                    batch.add(label, &[], Metric::uint64(value));
                }
            }
            "procs_running" | "procs_blocked" => {
                if let Some(Ok(value)) = fields.next().map(str::parse::<u32>) {
                    batch.add(label, &[], Metric::uint32(value));
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Collector for CpuCollector {
    async fn collect(&self, token: &CancellationToken) -> Result<(), CollectorError> {
        self.core.begin_run()?;
        let outcome = self.gather(token).await;
        self.core.end_run(outcome)
    }

    fn flush(&self) -> MetricSet {
        self.core.flush()
    }

    fn id(&self) -> &str {
        self.core.id()
    }

    fn inventory(&self) -> InventoryRecord {
        self.core.inventory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricValue;

    const STAT: &str = "\
cpu  10132153 290696 3084719 46828483 16683 0 25195 0 0 0
cpu0 5066076 145348 1542359 23414241 8341 0 12597 0 0 0
cpu1 5066077 145348 1542360 23414242 8342 0 12598 0 0 0
intr 1462898 0 1 2
ctxt 115315133
btime 1625738400
processes 998339
procs_running 4
procs_blocked 1
softirq 523122 0 1 2
";

    fn collect_into_set(report_per_cpu: bool) -> MetricSet {
        let activation = MetricActivation::enabled_by_default();
        let mut batch = MetricBatch::new(ID, &activation);
        parse_stat(STAT, report_per_cpu, &mut batch);
        batch.into_set()
    }

    #[test]
    fn test_parse_aggregate_modes() {
        let set = collect_into_set(false);
        assert_eq!(set["cpu`user"].value, MetricValue::Uint(10132153));
        assert_eq!(set["cpu`idle"].value, MetricValue::Uint(46828483));
        assert_eq!(set["cpu`iowait"].value, MetricValue::Uint(16683));
    }

    #[test]
    fn test_parse_process_counters() {
        let set = collect_into_set(false);
        assert_eq!(set["cpu`ctxt"].value, MetricValue::Uint(115315133));
        assert_eq!(set["cpu`processes"].value, MetricValue::Uint(998339));
        assert_eq!(set["cpu`procs_running"].value, MetricValue::Uint(4));
        assert_eq!(set["cpu`procs_blocked"].value, MetricValue::Uint(1));
    }

    #[test]
    fn test_per_cpu_lines_skipped_by_default() {
        let set = collect_into_set(false);
        assert!(!set.keys().any(|name| name.contains("|ST[")));
    }

    #[test]
    fn test_per_cpu_lines_carry_stream_tags() {
        let set = collect_into_set(true);
        let tagged: Vec<&String> = set
            .keys()
            .filter(|name| name.starts_with("cpu`user|ST["))
            .collect();
        assert_eq!(tagged.len(), 2);
    }

    #[test]
    fn test_activation_drops_disabled_modes() {
        let mut status = std::collections::HashMap::new();
        status.insert("idle".to_string(), false);
        let activation = MetricActivation::new(status, true);

        let mut batch = MetricBatch::new(ID, &activation);
        parse_stat(STAT, false, &mut batch);
        let set = batch.into_set();

        assert!(set.contains_key("cpu`user"));
        assert!(!set.contains_key("cpu`idle"));
    }
}
