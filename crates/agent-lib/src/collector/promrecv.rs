//! Prometheus scrape collector
//!
//! Fetches a third-party text-exposition endpoint over HTTP and re-emits the
//! samples as agent metrics. Prometheus labels become stream tags. The fetch
//! deadline comes from the collector's own timeout setting; the run's
//! cancellation token aborts an in-flight request.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{async_trait, Collector, CollectorError, InventoryRecord, MetricBatch, RunCore};
use crate::activation::MetricActivation;
use crate::metrics::{Metric, MetricSet};
use crate::settings::{load_collector_settings, CommonSettings};
use crate::tags::Tag;

pub const ID: &str = "promrecv";

fn default_url() -> String {
    "http://127.0.0.1:9090/metrics".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromRecvSettings {
    #[serde(flatten)]
    pub common: CommonSettings,
    /// Endpoint serving the Prometheus text exposition format.
    pub url: String,
    /// Per-fetch deadline, independent of the run TTL.
    pub timeout_secs: u64,
}

impl Default for PromRecvSettings {
    fn default() -> Self {
        Self {
            common: CommonSettings::default(),
            url: default_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

pub struct PromRecvCollector {
    core: RunCore,
    activation: MetricActivation,
    url: String,
    client: reqwest::Client,
}

impl PromRecvCollector {
    pub fn from_config(config_dir: &Path) -> Result<Self> {
        let settings: PromRecvSettings = load_collector_settings(config_dir, ID)?;
        Self::new(settings)
    }

    pub fn new(settings: PromRecvSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("failed to build scrape client")?;

        Ok(Self {
            core: RunCore::new(ID, settings.common.run_ttl()),
            activation: settings.common.activation(),
            url: settings.url,
            client,
        })
    }

    async fn gather(&self, token: &CancellationToken) -> Result<MetricSet, CollectorError> {
        let body = tokio::select! {
            response = self.fetch() => response?,
            _ = token.cancelled() => return Err(CollectorError::Cancelled),
        };

        let mut batch = MetricBatch::new(ID, &self.activation);
        parse_exposition(&body, &mut batch);
        Ok(batch.into_set())
    }

    async fn fetch(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("failed to scrape {}", self.url))?
            .error_for_status()
            .with_context(|| format!("scrape of {} refused", self.url))?;
        response.text().await.context("failed to read scrape body")
    }
}

/// Parses Prometheus text-exposition lines: `name{labels} value [timestamp]`.
/// Comments, blank lines, and unparsable samples are skipped.
fn parse_exposition(body: &str, batch: &mut MetricBatch<'_>) {
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (name, labels, rest) = match line.find('{') {
            Some(open) => {
                let Some(close) = line[open..].find('}') else {
                    continue;
                };
                let close = open + close;
                (
                    &line[..open],
                    parse_labels(&line[open + 1..close]),
                    line[close + 1..].trim(),
                )
            }
            None => {
                let Some((name, rest)) = line.split_once(char::is_whitespace) else {
                    continue;
                };
                (name, Vec::new(), rest.trim())
            }
        };

        // Value first, optional timestamp ignored.
        let Some(raw_value) = rest.split_whitespace().next() else {
            continue;
        };
        let Ok(value) = raw_value.parse::<f64>() else {
            continue;
        };

        batch.add(name, &labels, Metric::double(value));
    }
}

/// Parses a `k="v",k2="v2"` label block into tags.
fn parse_labels(block: &str) -> Vec<Tag> {
    block
        .split(',')
        .filter_map(|pair| {
            let (key, raw) = pair.split_once('=')?;
            let value = raw.trim().trim_matches('"');
            if key.trim().is_empty() || value.is_empty() {
                return None;
            }
            Some(Tag::new(key.trim(), value))
        })
        .collect()
}

#[async_trait]
impl Collector for PromRecvCollector {
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
