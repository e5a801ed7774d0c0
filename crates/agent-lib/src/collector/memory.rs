//! Memory collector
//!
//! Reads `/proc/meminfo`. Kernel values are kB; everything is reported in
//! bytes, with derived used and used-percent metrics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{async_trait, Collector, CollectorError, InventoryRecord, MetricBatch, RunCore};
use crate::activation::MetricActivation;
use crate::metrics::{Metric, MetricSet};
use crate::settings::{load_collector_settings, CommonSettings};
use crate::tags::Tag;

pub const ID: &str = "memory";

/// meminfo field -> reported bare metric name.
const FIELDS: [(&str, &str); 8] = [
    ("MemTotal", "total"),
    ("MemFree", "free"),
    ("MemAvailable", "available"),
    ("Buffers", "buffers"),
    ("Cached", "cached"),
    ("Shmem", "shared"),
    ("SwapTotal", "swap_total"),
    ("SwapFree", "swap_free"),
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    #[serde(flatten)]
    pub common: CommonSettings,
}

pub struct MemoryCollector {
    core: RunCore,
    activation: MetricActivation,
    meminfo_path: PathBuf,
}

impl MemoryCollector {
    pub fn from_config(config_dir: &Path) -> Result<Self> {
        let settings: MemorySettings = load_collector_settings(config_dir, ID)?;
        Ok(Self::new(settings))
    }

    pub fn new(settings: MemorySettings) -> Self {
        Self {
            core: RunCore::new(ID, settings.common.run_ttl()),
            activation: settings.common.activation(),
            meminfo_path: PathBuf::from("/proc/meminfo"),
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
                read = tokio::fs::read_to_string(&self.meminfo_path) => read
                    .with_context(|| format!("failed to read {}", self.meminfo_path.display()))?,
                _ = token.cancelled() => return Err(CollectorError::Cancelled),
            };

            let mut batch = MetricBatch::new(ID, &self.activation);
            parse_meminfo(&content, &mut batch);
            Ok(batch.into_set())
        }
    }
}

/// Parses `/proc/meminfo` content (`Field:   <kB> kB`) into bytes.
fn parse_meminfo(content: &str, batch: &mut MetricBatch<'_>) {
    let mut values: HashMap<&str, u64> = HashMap::new();
    for line in content.lines() {
        let Some((field, rest)) = line.split_once(':') else {
            continue;
        };
        if let Some(kb) = rest.split_whitespace().next().and_then(|raw| raw.parse::<u64>().ok()) {
            values.insert(field, kb * 1024);
        }
    }

    let bytes_tag = [Tag::new("units", "bytes")];
    for (field, name) in FIELDS {
        if let Some(value) = values.get(field) {
            batch.add(name, &bytes_tag, Metric::uint64(*value));
        }
    }

    let total = values.get("MemTotal").copied().unwrap_or(0);
    if total > 0 {
        let free = values.get("MemFree").copied().unwrap_or(0);
        let buffers = values.get("Buffers").copied().unwrap_or(0);
        let cached = values.get("Cached").copied().unwrap_or(0);
        let used = total.saturating_sub(free + buffers + cached);

        batch.add("used", &bytes_tag, Metric::uint64(used));
        batch.add(
            "used_pct",
            &[],
            Metric::double(used as f64 / total as f64 * 100.0),
        );
    }
}

#[async_trait]
impl Collector for MemoryCollector {
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
