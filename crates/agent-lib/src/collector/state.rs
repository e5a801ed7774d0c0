//! Shared per-collector run state
//!
//! One implementation of the throttling/overlap discipline, composed into
//! every concrete source via delegation. The state machine has two states,
//! idle and running; entering the running state is guarded by the collector's
//! own lock plus the TTL gate, and the lock is released before any collection
//! work happens, so flush and inventory reads never wait on a slow source.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::trace;

use super::{CollectorError, InventoryRecord};
use crate::activation::MetricActivation;
use crate::metrics::{Metric, MetricSet};
use crate::tags::{metric_name_with_stream_tags, Tag};

/// Reported by the add-metric primitive when activation drops a metric;
/// callers treat it as expected and ignore it.
#[derive(Debug, thiserror::Error)]
#[error("metric {0:?} not active")]
pub struct InactiveMetric(pub String);

#[derive(Default)]
struct RunState {
    running: bool,
    last_start: Option<DateTime<Utc>>,
    last_end: Option<DateTime<Utc>>,
    last_duration: Duration,
    last_error: Option<String>,
    last_metrics: MetricSet,
}

/// The mutex-guarded base record every builtin collector composes.
pub struct RunCore {
    id: String,
    run_ttl: Duration,
    state: Mutex<RunState>,
}

impl RunCore {
    /// `run_ttl` of zero disables throttling.
    pub fn new(id: impl Into<String>, run_ttl: Duration) -> Self {
        Self {
            id: id.into(),
            run_ttl,
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().expect("run state lock poisoned")
    }

    /// Attempts the idle-to-running transition.
    ///
    /// Rejected with [`CollectorError::AlreadyRunning`] while a run is in
    /// flight (checked first, so a concurrent pair resolves deterministically)
    /// and with [`CollectorError::TtlNotExpired`] before the minimum interval
    /// since the previous run's end has elapsed. On success the running flag
    /// and start timestamp are set and the lock is released; the caller does
    /// its collection work outside the lock and must finish with
    /// [`RunCore::end_run`].
    pub fn begin_run(&self) -> Result<(), CollectorError> {
        let mut state = self.lock();
        if state.running {
            return Err(CollectorError::AlreadyRunning);
        }
        if !self.run_ttl.is_zero() {
            if let Some(last_end) = state.last_end {
                let elapsed = Utc::now()
                    .signed_duration_since(last_end)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if elapsed < self.run_ttl {
                    return Err(CollectorError::TtlNotExpired);
                }
            }
        }
        state.running = true;
        state.last_start = Some(Utc::now());
        Ok(())
    }

    /// Completes a run started by [`RunCore::begin_run`].
    ///
    /// Success installs the new snapshot and clears the error; any failure
    /// (cancellation included) clears the snapshot to empty and records the
    /// error text. Either way the collector ends up idle with its end
    /// timestamp and duration updated, and the original outcome is handed
    /// back to the caller.
    pub fn end_run(&self, outcome: Result<MetricSet, CollectorError>) -> Result<(), CollectorError> {
        let mut state = self.lock();
        let end = Utc::now();
        state.last_duration = state
            .last_start
            .map(|start| end.signed_duration_since(start).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(Duration::ZERO);
        state.last_end = Some(end);
        state.running = false;

        match outcome {
            Ok(metrics) => {
                state.last_metrics = metrics;
                state.last_error = None;
                Ok(())
            }
            Err(err) => {
                state.last_metrics = MetricSet::new();
                state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Clone of the last successfully collected snapshot.
    pub fn flush(&self) -> MetricSet {
        self.lock().last_metrics.clone()
    }

    pub fn inventory(&self) -> InventoryRecord {
        let state = self.lock();
        InventoryRecord {
            id: self.id.clone(),
            last_run_start: format_timestamp(state.last_start),
            last_run_end: format_timestamp(state.last_end),
            last_run_duration: format!("{:?}", state.last_duration),
            last_error: state.last_error.clone().unwrap_or_default(),
        }
    }
}

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .unwrap_or_default()
}

/// Per-run staging buffer.
///
/// Owned by the collecting task, never shared; applies the activation policy
/// and stream-tag decoration on insert and is installed wholesale by
/// [`RunCore::end_run`]. Names are prefixed `<collector id>` + backtick +
/// `<bare name>` before decoration.
pub struct MetricBatch<'a> {
    prefix: &'a str,
    activation: &'a MetricActivation,
    metrics: MetricSet,
}

impl<'a> MetricBatch<'a> {
    pub fn new(prefix: &'a str, activation: &'a MetricActivation) -> Self {
        Self {
            prefix,
            activation,
            metrics: MetricSet::new(),
        }
    }

    /// Adds one observation, reporting [`InactiveMetric`] when the activation
    /// policy drops it.
    pub fn try_add(
        &mut self,
        name: &str,
        tags: &[Tag],
        metric: Metric,
    ) -> Result<(), InactiveMetric> {
        if !self.activation.is_active(name) {
            return Err(InactiveMetric(name.to_string()));
        }
        let full = format!("{}`{}", self.prefix, name);
        self.metrics
            .insert(metric_name_with_stream_tags(&full, tags), metric);
        Ok(())
    }

    /// [`MetricBatch::try_add`], with the not-active condition logged at
    /// trace level and swallowed, the expected treatment at call sites.
    pub fn add(&mut self, name: &str, tags: &[Tag], metric: Metric) {
        if let Err(dropped) = self.try_add(name, tags, metric) {
            trace!(metric = %dropped.0, collector = %self.prefix, "metric not active, dropped");
        }
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn into_set(self) -> MetricSet {
        self.metrics
    }
}
