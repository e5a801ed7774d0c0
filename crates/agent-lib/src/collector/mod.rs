//! Collector contract and builtin metric sources
//!
//! Every metric source plugs into the agent through one interface: collect a
//! cycle, flush the last snapshot, identify itself, report inventory. The
//! registry (`registry` module) owns a set of such sources and runs them
//! concurrently; the shared run-state record (`state` module) gives every
//! source the same throttling and overlap discipline.

mod cpu;
mod disk;
mod memory;
mod network;
mod promrecv;
mod protocols;
mod registry;
mod state;

pub use cpu::CpuCollector;
pub use disk::DiskCollector;
pub use memory::MemoryCollector;
pub use network::NetworkCollector;
pub use promrecv::PromRecvCollector;
pub use protocols::ProtocolsCollector;
pub use registry::{Registry, RegistryError};
pub use state::{InactiveMetric, MetricBatch, RunCore};

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::metrics::MetricSet;

pub use async_trait::async_trait;

/// Failure taxonomy surfaced by [`Collector::collect`].
#[derive(Debug, Error)]
pub enum CollectorError {
    /// A run was requested while one was in flight; skip and retry later.
    #[error("collection already running")]
    AlreadyRunning,
    /// A run was requested before the minimum inter-run interval elapsed.
    #[error("minimum interval between runs has not expired")]
    TtlNotExpired,
    /// The source has no implementation on the current operating system.
    #[error("not implemented on this platform")]
    NotImplemented,
    /// The run's cancellation token fired mid-collection.
    #[error("collection cancelled")]
    Cancelled,
    /// Source-specific I/O or parse failure.
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

impl CollectorError {
    /// True for the expected, non-exceptional outcomes of concurrent or
    /// rate-limited scheduling. These are logged and never escalated.
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            CollectorError::AlreadyRunning
                | CollectorError::TtlNotExpired
                | CollectorError::NotImplemented
        )
    }
}

/// Introspection snapshot of a collector's recent history.
///
/// Timestamps are RFC3339 with nanosecond precision (sortable); unset fields
/// render as empty strings.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryRecord {
    pub id: String,
    pub last_run_start: String,
    pub last_run_end: String,
    pub last_run_duration: String,
    pub last_error: String,
}

/// A named, independently schedulable metric source.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Performs one collection cycle.
    ///
    /// Safe to invoke concurrently with other collectors; invocations of the
    /// same collector are serialized by rejection: a second concurrent call
    /// observes [`CollectorError::AlreadyRunning`] instead of waiting. On
    /// failure the last snapshot is cleared, never served stale. A cancelled
    /// token makes the run return promptly with
    /// [`CollectorError::Cancelled`], leaving the collector idle.
    async fn collect(&self, token: &CancellationToken) -> Result<(), CollectorError>;

    /// Returns the most recent successfully collected snapshot.
    ///
    /// Never blocks on an in-progress run and never returns stale data after
    /// a failure; before the first successful run this is the empty set.
    fn flush(&self) -> MetricSet;

    /// Stable identifier, used as the registry key and metric-name prefix.
    fn id(&self) -> &str;

    /// Introspection snapshot for the control plane.
    fn inventory(&self) -> InventoryRecord;
}
