//! Collector registry and concurrent run engine
//!
//! Owns the id-to-collector mapping (built once at configuration time,
//! read-mostly afterwards) and dispatches collection runs: one concurrent
//! task per collector for "run all", joined before the registry-wide running
//! flag clears. Partial failure is the normal case: a collector's own
//! failure is logged and never aborts the batch. The registry depends on the
//! [`Collector`] contract only, never on concrete sources.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Collector, InventoryRecord};
use crate::metrics::MetricSet;
use crate::stats::AgentStats;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown collector {0:?}")]
    UnknownCollector(String),
}

pub struct Registry {
    collectors: HashMap<String, Arc<dyn Collector>>,
    running: AtomicBool,
    stats: AgentStats,
}

impl Registry {
    pub fn new(stats: AgentStats) -> Self {
        Self {
            collectors: HashMap::new(),
            running: AtomicBool::new(false),
            stats,
        }
    }

    /// Adds a collector keyed by its id. The last registration for an id
    /// wins, letting a more specific source shadow a generic one registered
    /// earlier; register fallbacks first.
    pub fn register(&mut self, collector: Arc<dyn Collector>) {
        let id = collector.id().to_string();
        if self.collectors.insert(id.clone(), collector).is_some() {
            debug!(collector = %id, "collector re-registered, later registration wins");
        }
    }

    /// Membership test; false for the empty id.
    pub fn is_builtin(&self, id: &str) -> bool {
        !id.is_empty() && self.collectors.contains_key(id)
    }

    /// Runs one collector, or every collector concurrently when `id` is
    /// empty.
    ///
    /// The run-all path is guarded by the registry-wide running flag: an
    /// overlapping call is logged and ignored, not an error. Per-collector
    /// failures are logged and never fail the batch. The cancellation token
    /// is propagated to every in-flight collector.
    pub async fn run(&self, id: &str, token: &CancellationToken) -> Result<(), RegistryError> {
        if id.is_empty() {
            self.run_all(token).await;
            return Ok(());
        }

        let collector = self
            .collectors
            .get(id)
            .ok_or_else(|| RegistryError::UnknownCollector(id.to_string()))?;
        run_one(collector.clone(), token.clone(), self.stats.clone()).await;
        Ok(())
    }

    async fn run_all(&self, token: &CancellationToken) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("collection already in progress, ignoring run request");
            return;
        }
        self.stats.inc_runs();

        let mut runs = JoinSet::new();
        for collector in self.collectors.values() {
            let collector = collector.clone();
            let token = token.clone();
            let stats = self.stats.clone();
            runs.spawn(async move { run_one(collector, token, stats).await });
        }

        // Join barrier: the running flag clears only after every collector
        // task has finished.
        while let Some(joined) = runs.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "collection task failed to join");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Merges the last-flushed metric set of one collector, or of every
    /// collector when `id` is empty (later collector wins silently on a name
    /// collision; ids prefix names, so collisions are rare). Pure read.
    pub fn flush(&self, id: &str) -> MetricSet {
        if id.is_empty() {
            let mut merged = MetricSet::new();
            for collector in self.collectors.values() {
                merged.extend(collector.flush());
            }
            self.stats.set_metrics_flushed(merged.len());
            return merged;
        }

        self.collectors
            .get(id)
            .map(|collector| collector.flush())
            .unwrap_or_default()
    }

    /// Introspection records for every collector, sorted by id.
    pub fn inventory(&self) -> Vec<InventoryRecord> {
        let mut records: Vec<InventoryRecord> = self
            .collectors
            .values()
            .map(|collector| collector.inventory())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Registered collector ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.collectors.keys().cloned().collect();
        ids.sort();
        ids
    }
}

async fn run_one(collector: Arc<dyn Collector>, token: CancellationToken, stats: AgentStats) {
    let started = Instant::now();
    match collector.collect(&token).await {
        Ok(()) => {
            stats.observe_collection_latency(collector.id(), started.elapsed());
            debug!(
                collector = %collector.id(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "collection complete"
            );
        }
        Err(err) if err.is_control_flow() => {
            warn!(collector = %collector.id(), reason = %err, "collection skipped");
        }
        Err(err) => {
            stats.inc_collection_errors(collector.id());
            warn!(collector = %collector.id(), error = %err, "collection failed");
        }
    }
}
