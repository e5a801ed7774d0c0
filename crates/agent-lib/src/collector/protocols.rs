//! Protocol counters collector
//!
//! Reads `/proc/net/snmp`, where each protocol contributes a header line and
//! a value line sharing a `Proto:` prefix. Protocols are gated by the
//! include/exclude filter and the protocol name travels as a stream tag.
//! Some fields (e.g. `Tcp: MaxConn`) are signed by definition, so values
//! parse as signed first and fall back to unsigned.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{async_trait, Collector, CollectorError, InventoryRecord, MetricBatch, RunCore};
use crate::activation::{MetricActivation, ResourceFilter};
use crate::metrics::{Metric, MetricSet};
use crate::settings::{load_collector_settings, CommonSettings, FilterSettings};
use crate::tags::Tag;

pub const ID: &str = "protocols";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProtocolsSettings {
    #[serde(flatten)]
    pub common: CommonSettings,
    #[serde(flatten)]
    pub filter: FilterSettings,
}

pub struct ProtocolsCollector {
    core: RunCore,
    activation: MetricActivation,
    filter: ResourceFilter,
    snmp_path: PathBuf,
}

impl ProtocolsCollector {
    pub fn from_config(config_dir: &Path) -> Result<Self> {
        let settings: ProtocolsSettings = load_collector_settings(config_dir, ID)?;
        Self::new(settings)
    }

    /// Fails when the configured include/exclude patterns do not compile.
    pub fn new(settings: ProtocolsSettings) -> Result<Self> {
        Ok(Self {
            core: RunCore::new(ID, settings.common.run_ttl()),
            activation: settings.common.activation(),
            filter: settings.filter.build()?,
            snmp_path: PathBuf::from("/proc/net/snmp"),
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
                read = tokio::fs::read_to_string(&self.snmp_path) => read
                    .with_context(|| format!("failed to read {}", self.snmp_path.display()))?,
                _ = token.cancelled() => return Err(CollectorError::Cancelled),
            };

            let mut batch = MetricBatch::new(ID, &self.activation);
            parse_snmp(&content, &self.filter, &mut batch);
            Ok(batch.into_set())
        }
    }
}

/// Parses `/proc/net/snmp` header/value line pairs.
fn parse_snmp(content: &str, filter: &ResourceFilter, batch: &mut MetricBatch<'_>) {
    let mut lines = content.lines();
    while let (Some(header), Some(values)) = (lines.next(), lines.next()) {
        let (Some((proto, names)), Some((proto_check, raws))) =
            (header.split_once(':'), values.split_once(':'))
        else {
            continue;
        };
        if proto != proto_check {
            continue;
        }

        let proto = proto.trim().to_lowercase();
        if !filter.allows(&proto) {
            continue;
        }

        let tags = [Tag::new("proto", proto)];
        for (name, raw) in names.split_whitespace().zip(raws.split_whitespace()) {
            let metric = if let Ok(signed) = raw.parse::<i64>() {
                Metric::int64(signed)
            } else if let Ok(unsigned) = raw.parse::<u64>() {
                Metric::uint64(unsigned)
            } else {
                continue;
            };
            batch.add(name, &tags, metric);
        }
    }
}

#[async_trait]
impl Collector for ProtocolsCollector {
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

    const SNMP: &str = "\
Ip: Forwarding DefaultTTL InReceives InHdrErrors
Ip: 1 64 1925587 0
Tcp: RtoAlgorithm RtoMin RtoMax MaxConn ActiveOpens
Tcp: 1 200 120000 -1 63776
Udp: InDatagrams NoPorts InErrors
Udp: 93101 14 0
";

    fn collect_into_set(filter: &ResourceFilter) -> MetricSet {
        let activation = MetricActivation::enabled_by_default();
        let mut batch = MetricBatch::new(ID, &activation);
        parse_snmp(SNMP, filter, &mut batch);
        batch.into_set()
    }

    fn value_of(set: &MetricSet, bare: &str) -> Option<MetricValue> {
        set.iter()
            .find(|(name, _)| name.starts_with(&format!("{}`{}|ST[", ID, bare)))
            .map(|(_, metric)| metric.value.clone())
    }

    #[test]
    fn test_parse_pairs_header_with_values() {
        let set = collect_into_set(&ResourceFilter::default());
        assert_eq!(value_of(&set, "InReceives"), Some(MetricValue::Int(1925587)));
        assert_eq!(value_of(&set, "InDatagrams"), Some(MetricValue::Int(93101)));
    }

    #[test]
    fn test_signed_fields_stay_signed() {
        let set = collect_into_set(&ResourceFilter::default());
        assert_eq!(value_of(&set, "MaxConn"), Some(MetricValue::Int(-1)));
    }

    #[test]
    fn test_protocol_filter() {
        let filter = ResourceFilter::new("^tcp$", "^$").unwrap();
        let set = collect_into_set(&filter);
        assert_eq!(set.len(), 5);
        assert!(value_of(&set, "InDatagrams").is_none());
    }

    #[test]
    fn test_protocol_travels_as_tag() {
        let set = collect_into_set(&ResourceFilter::default());
        assert!(set.keys().all(|name| name.contains("|ST[")));
    }
}
