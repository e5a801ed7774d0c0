//! Disk collector
//!
//! Reads `/proc/diskstats` and reports per-device I/O counters. Devices are
//! gated by the include/exclude filter; the device name travels as a stream
//! tag rather than inside the metric name.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{async_trait, Collector, CollectorError, InventoryRecord, MetricBatch, RunCore};
use crate::activation::{MetricActivation, ResourceFilter};
use crate::metrics::{Metric, MetricSet};
use crate::settings::{load_collector_settings, CommonSettings, FilterSettings};
use crate::tags::Tag;

pub const ID: &str = "disk";

/// Counter columns of one diskstats line, in field order after the device
/// name.
const COUNTERS: [&str; 11] = [
    "reads",
    "reads_merged",
    "sectors_read",
    "read_ms",
    "writes",
    "writes_merged",
    "sectors_written",
    "write_ms",
    "io_in_progress",
    "io_ms",
    "io_ms_weighted",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiskSettings {
    #[serde(flatten)]
    pub common: CommonSettings,
    #[serde(flatten)]
    pub filter: FilterSettings,
}

pub struct DiskCollector {
    core: RunCore,
    activation: MetricActivation,
    filter: ResourceFilter,
    diskstats_path: PathBuf,
}

impl DiskCollector {
    pub fn from_config(config_dir: &Path) -> Result<Self> {
        let settings: DiskSettings = load_collector_settings(config_dir, ID)?;
        Self::new(settings)
    }

    /// Fails when the configured include/exclude patterns do not compile.
    pub fn new(settings: DiskSettings) -> Result<Self> {
        Ok(Self {
            core: RunCore::new(ID, settings.common.run_ttl()),
            activation: settings.common.activation(),
            filter: settings.filter.build()?,
            diskstats_path: PathBuf::from("/proc/diskstats"),
        })
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
                read = tokio::fs::read_to_string(&self.diskstats_path) => read
                    .with_context(|| format!("failed to read {}", self.diskstats_path.display()))?,
                _ = token.cancelled() => return Err(CollectorError::Cancelled),
            };

            let mut batch = MetricBatch::new(ID, &self.activation);
            parse_diskstats(&content, &self.filter, &mut batch);
            Ok(batch.into_set())
        }
    }
}

/// Parses `/proc/diskstats` lines: `major minor device counters...`.
fn parse_diskstats(content: &str, filter: &ResourceFilter, batch: &mut MetricBatch<'_>) {
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // major, minor, device, and at least the read/write counters
        if fields.len() < 3 + 8 {
            continue;
        }

        let device = fields[2];
        if !filter.allows(device) {
            continue;
        }

        let tags = [Tag::new("device", device)];
        for (name, raw) in COUNTERS.iter().zip(&fields[3..]) {
            if let Ok(value) = raw.parse::<u64>() {
                batch.add(name, &tags, Metric::uint64(value));
            }
        }
    }
}

#[async_trait]
impl Collector for DiskCollector {
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
