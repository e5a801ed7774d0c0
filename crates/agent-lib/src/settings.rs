//! Per-collector settings loading
//!
//! Each builtin collector is constructed from a configuration-file base name
//! resolved inside the agent's collector config directory. The `config` crate
//! probes the known extensions, and absence of a file is not an error; the
//! collector comes up with built-in defaults. Malformed content fails only
//! the affected collector's construction.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::activation::{
    MetricActivation, ResourceFilter, DEFAULT_EXCLUDE_PATTERN, DEFAULT_INCLUDE_PATTERN,
};

/// Loads a collector's settings from `<dir>/<base_name>.<ext>`.
///
/// The extension is resolved by the configuration layer; a missing file
/// yields the settings type's defaults.
pub fn load_collector_settings<T>(dir: &Path, base_name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let source = config::File::from(dir.join(base_name)).required(false);
    let loaded = config::Config::builder()
        .add_source(source)
        .build()
        .with_context(|| format!("failed to read settings for collector {:?}", base_name))?;

    loaded
        .try_deserialize()
        .with_context(|| format!("malformed settings for collector {:?}", base_name))
}

/// Default activity for metric names absent from the explicit lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultMetricStatus {
    #[default]
    Enabled,
    Disabled,
}

/// Settings shared by every builtin collector.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommonSettings {
    /// Minimum seconds between run starts; zero disables throttling.
    pub run_ttl_secs: u64,
    /// Bare metric names explicitly enabled.
    pub metrics_enabled: Vec<String>,
    /// Bare metric names explicitly disabled.
    pub metrics_disabled: Vec<String>,
    /// Activity applied to names absent from both lists.
    pub metrics_default_status: DefaultMetricStatus,
}

impl CommonSettings {
    pub fn run_ttl(&self) -> Duration {
        Duration::from_secs(self.run_ttl_secs)
    }

    /// Builds the immutable activation state for this collector.
    ///
    /// A name listed both ways resolves to disabled.
    pub fn activation(&self) -> MetricActivation {
        let mut status: HashMap<String, bool> = HashMap::new();
        for name in &self.metrics_enabled {
            status.insert(name.clone(), true);
        }
        for name in &self.metrics_disabled {
            status.insert(name.clone(), false);
        }
        MetricActivation::new(
            status,
            self.metrics_default_status == DefaultMetricStatus::Enabled,
        )
    }
}

/// Include/exclude pattern pair for collectors over enumerable resources.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub include_regex: String,
    pub exclude_regex: String,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            include_regex: DEFAULT_INCLUDE_PATTERN.to_string(),
            exclude_regex: DEFAULT_EXCLUDE_PATTERN.to_string(),
        }
    }
}

impl FilterSettings {
    pub fn build(&self) -> Result<ResourceFilter> {
        ResourceFilter::new(&self.include_regex, &self.exclude_regex)
            .context("invalid include/exclude pattern")
    }
}
