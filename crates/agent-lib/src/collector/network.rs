//! Network collector
//!
//! Reads `/proc/net/dev` and reports per-interface traffic counters. The
//! interface name travels as a stream tag, and the loopback interface is
//! excluded by default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{async_trait, Collector, CollectorError, InventoryRecord, MetricBatch, RunCore};
use crate::activation::{
    MetricActivation, ResourceFilter, DEFAULT_INCLUDE_PATTERN, DEFAULT_LOOPBACK_EXCLUDE,
};
use crate::metrics::{Metric, MetricSet};
use crate::settings::{load_collector_settings, CommonSettings};
use crate::tags::Tag;

pub const ID: &str = "network";

/// Columns of one `/proc/net/dev` line: 8 receive then 8 transmit.
const RX_COUNTERS: [&str; 4] = ["in_bytes", "in_packets", "in_errors", "in_drops"];
const TX_COUNTERS: [&str; 4] = ["out_bytes", "out_packets", "out_errors", "out_drops"];

fn default_include() -> String {
    DEFAULT_INCLUDE_PATTERN.to_string()
}

fn default_exclude() -> String {
    DEFAULT_LOOPBACK_EXCLUDE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSettings {
    #[serde(flatten)]
    pub common: CommonSettings,
    /// Interfaces to consider; everything by default.
    #[serde(default = "default_include")]
    pub include_regex: String,
    /// Interfaces to skip; loopback by default.
    #[serde(default = "default_exclude")]
    pub exclude_regex: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            common: CommonSettings::default(),
            include_regex: default_include(),
            exclude_regex: default_exclude(),
        }
    }
}

impl NetworkSettings {
    fn filter(&self) -> Result<ResourceFilter> {
        ResourceFilter::new(&self.include_regex, &self.exclude_regex)
            .context("invalid include/exclude pattern")
    }
}

pub struct NetworkCollector {
    core: RunCore,
    activation: MetricActivation,
    filter: ResourceFilter,
    netdev_path: PathBuf,
}

impl NetworkCollector {
    pub fn from_config(config_dir: &Path) -> Result<Self> {
        let settings: NetworkSettings = load_collector_settings(config_dir, ID)?;
        Self::new(settings)
    }

    /// Fails when the configured include/exclude patterns do not compile.
    pub fn new(settings: NetworkSettings) -> Result<Self> {
        Ok(Self {
            core: RunCore::new(ID, settings.common.run_ttl()),
            activation: settings.common.activation(),
            filter: settings.filter()?,
            netdev_path: PathBuf::from("/proc/net/dev"),
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
                read = tokio::fs::read_to_string(&self.netdev_path) => read
                    .with_context(|| format!("failed to read {}", self.netdev_path.display()))?,
                _ = token.cancelled() => return Err(CollectorError::Cancelled),
            };

            let mut batch = MetricBatch::new(ID, &self.activation);
            parse_netdev(&content, &self.filter, &mut batch);
            Ok(batch.into_set())
        }
    }
}

/// Parses `/proc/net/dev` content: two header lines, then
/// `iface: rx_bytes rx_packets rx_errs rx_drop ... tx_bytes ...`.
fn parse_netdev(content: &str, filter: &ResourceFilter, batch: &mut MetricBatch<'_>) {
    for line in content.lines().skip(2) {
        let Some((iface, counters)) = line.split_once(':') else {
            continue;
        };
        let iface = iface.trim();
        if iface.is_empty() || !filter.allows(iface) {
            continue;
        }

        let fields: Vec<u64> = counters
            .split_whitespace()
            .map(|raw| raw.parse::<u64>().unwrap_or(0))
            .collect();
        if fields.len() < 16 {
            continue;
        }

        let tags = [Tag::new("interface", iface)];
        for (name, value) in RX_COUNTERS.iter().zip(&fields[0..4]) {
            batch.add(name, &tags, Metric::uint64(*value));
        }
        for (name, value) in TX_COUNTERS.iter().zip(&fields[8..12]) {
            batch.add(name, &tags, Metric::uint64(*value));
        }
    }
}

#[async_trait]
impl Collector for NetworkCollector {
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
