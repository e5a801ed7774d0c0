//! Agent configuration

use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Control-plane listen port
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Seconds between registry-wide collection runs
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// Builtin collector ids to construct at startup
    #[serde(default = "default_collectors")]
    pub collectors: Vec<String>,

    /// Directory holding per-collector config files
    #[serde(default = "default_collector_config_dir")]
    pub collector_config_dir: PathBuf,

    /// Operator-supplied check-level tag list, `category:value,...`
    #[serde(default)]
    pub check_tags: String,
}

fn default_listen_port() -> u16 {
    2609
}

fn default_collection_interval() -> u64 {
    60
}

fn default_collectors() -> Vec<String> {
    ["cpu", "memory", "disk", "network", "protocols"]
        .iter()
        .map(|id| id.to_string())
        .collect()
}

fn default_collector_config_dir() -> PathBuf {
    PathBuf::from("/etc/host-agent/collectors.d")
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            collection_interval_secs: default_collection_interval(),
            collectors: default_collectors(),
            collector_config_dir: default_collector_config_dir(),
            check_tags: String::new(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from an optional file and the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("host-agent").required(false))
            .add_source(config::Environment::with_prefix("HMA"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.listen_port, 2609);
        assert_eq!(config.collection_interval_secs, 60);
        assert!(config.collectors.contains(&"cpu".to_string()));
        assert!(config.check_tags.is_empty());
    }
}
