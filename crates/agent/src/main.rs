//! Host metrics agent
//!
//! Resident process that periodically runs every configured collector,
//! keeps their last snapshots available for flushing, and exposes the
//! HTTP control plane.

use std::sync::Arc;
use std::time::Duration;

use agent_lib::collector::{
    Collector, CpuCollector, DiskCollector, MemoryCollector, NetworkCollector, PromRecvCollector,
    ProtocolsCollector,
};
use agent_lib::{prep_stream_tags, AgentStats, Receiver, Registry};
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

use config::AgentConfig;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = AGENT_VERSION, "starting host-agent");

    let config = AgentConfig::load()?;
    info!(
        listen_port = config.listen_port,
        interval_secs = config.collection_interval_secs,
        "agent configured"
    );

    let check_tag_suffix =
        prep_stream_tags(&config.check_tags).context("invalid check_tags configuration")?;

    let stats_registry = prometheus::Registry::new();
    let stats = AgentStats::new(&stats_registry).context("failed to register agent stats")?;

    let registry = build_registry(&config, stats);
    info!(collectors = ?registry.ids(), "collectors registered");

    let shutdown = CancellationToken::new();
    let state = Arc::new(api::AppState {
        registry,
        receiver: Receiver::new(),
        stats_registry,
        shutdown: shutdown.clone(),
        check_tag_suffix,
    });

    let collection = tokio::spawn(collection_loop(
        state.clone(),
        Duration::from_secs(config.collection_interval_secs),
        shutdown.clone(),
    ));

    let server = tokio::spawn(api::serve(config.listen_port, state));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown.cancel();

    collection.await?;
    server.await??;
    info!("host-agent stopped");

    Ok(())
}

/// Constructs every configured builtin collector. A collector whose
/// configuration fails to load is skipped with a warning; the agent runs
/// with the rest.
fn build_registry(config: &AgentConfig, stats: AgentStats) -> Registry {
    let mut registry = Registry::new(stats);
    let dir = config.collector_config_dir.as_path();

    for id in &config.collectors {
        let built: Result<Arc<dyn Collector>> = match id.as_str() {
            "cpu" => CpuCollector::from_config(dir).map(|c| Arc::new(c) as Arc<dyn Collector>),
            "memory" => {
                MemoryCollector::from_config(dir).map(|c| Arc::new(c) as Arc<dyn Collector>)
            }
            "disk" => DiskCollector::from_config(dir).map(|c| Arc::new(c) as Arc<dyn Collector>),
            "network" => {
                NetworkCollector::from_config(dir).map(|c| Arc::new(c) as Arc<dyn Collector>)
            }
            "protocols" => {
                ProtocolsCollector::from_config(dir).map(|c| Arc::new(c) as Arc<dyn Collector>)
            }
            "promrecv" => {
                PromRecvCollector::from_config(dir).map(|c| Arc::new(c) as Arc<dyn Collector>)
            }
            other => {
                warn!(collector = %other, "unknown collector id in configuration, skipping");
                continue;
            }
        };

        match built {
            Ok(collector) => registry.register(collector),
            Err(err) => {
                warn!(collector = %id, error = %err, "collector configuration failed, skipping")
            }
        }
    }

    registry
}

/// Periodic registry-wide collection alongside the control plane's
/// on-demand runs. The first tick fires immediately so flush has data as
/// soon as possible after startup.
async fn collection_loop(
    state: Arc<api::AppState>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "starting collection loop");
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Run-all never errors; per-collector failures are logged
                // inside the registry.
                let _ = state.registry.run("", &shutdown).await;
            }
            _ = shutdown.cancelled() => {
                info!("shutting down collection loop");
                break;
            }
        }
    }
}
