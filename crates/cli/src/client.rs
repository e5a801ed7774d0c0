//! HTTP client for the agent control plane

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// One metric as served by the agent's flush endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricRecord {
    #[serde(rename = "_type")]
    pub kind: String,
    #[serde(rename = "_value")]
    pub value: serde_json::Value,
}

/// Sorted name-to-metric mapping; BTreeMap keeps table output stable.
pub type MetricListing = BTreeMap<String, MetricRecord>;

/// One collector's introspection record.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryEntry {
    pub id: String,
    pub last_run_start: String,
    pub last_run_end: String,
    pub last_run_duration: String,
    pub last_error: String,
}

pub struct AgentClient {
    base_url: String,
    http: reqwest::Client,
}

impl AgentClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Flush the full metric set, or one collector's when `id` is given.
    pub async fn metrics(&self, id: Option<&str>) -> Result<MetricListing> {
        let url = match id {
            Some(id) => format!("{}/flush/{}", self.base_url, id),
            None => format!("{}/", self.base_url),
        };
        self.get_json(&url).await
    }

    /// Trigger a collection run, returning the refreshed metrics.
    pub async fn run(&self, id: Option<&str>) -> Result<MetricListing> {
        let url = match id {
            Some(id) => format!("{}/run/{}", self.base_url, id),
            None => format!("{}/run", self.base_url),
        };

        let response = self
            .http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .context("agent refused the run request")?;

        response.json().await.context("malformed agent response")
    }

    /// Fetch collector inventory records.
    pub async fn inventory(&self) -> Result<Vec<InventoryEntry>> {
        let url = format!("{}/inventory", self.base_url);
        self.get_json(&url).await
    }

    /// Submit external metrics under a group id.
    pub async fn write(&self, group: &str, payload: serde_json::Value) -> Result<()> {
        let url = format!("{}/write/{}", self.base_url, group);
        self.http
            .put(&url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .context("agent rejected the submission")?;
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("agent returned an error for {}", url))?;

        response.json().await.context("malformed agent response")
    }
}
