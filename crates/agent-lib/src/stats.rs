//! Agent self-stats
//!
//! Prometheus instruments for the agent's own behavior (collection latency,
//! run counts, error counts, flush sizes). All instruments are registered
//! against an explicitly passed `prometheus::Registry` and travel with the
//! collector registry's lifecycle; there is no process-global state.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

/// Histogram buckets for collection latency (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

struct StatsInner {
    collection_latency_seconds: HistogramVec,
    runs_total: IntCounter,
    collection_errors_total: IntCounterVec,
    metrics_flushed: IntGauge,
}

/// Cheaply cloneable handle over the agent's instruments.
#[derive(Clone)]
pub struct AgentStats {
    inner: Arc<StatsInner>,
}

impl AgentStats {
    /// Creates the instruments and registers them with `registry`.
    pub fn new(registry: &prometheus::Registry) -> Result<Self, prometheus::Error> {
        let collection_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "host_agent_collection_latency_seconds",
                "Time spent in one collector's collection run",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["collector"],
        )?;
        registry.register(Box::new(collection_latency_seconds.clone()))?;

        let runs_total = IntCounter::new(
            "host_agent_runs_total",
            "Number of registry-wide collection runs started",
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let collection_errors_total = IntCounterVec::new(
            Opts::new(
                "host_agent_collection_errors_total",
                "Number of failed collection runs per collector",
            ),
            &["collector"],
        )?;
        registry.register(Box::new(collection_errors_total.clone()))?;

        let metrics_flushed = IntGauge::new(
            "host_agent_metrics_flushed",
            "Number of metrics returned by the most recent full flush",
        )?;
        registry.register(Box::new(metrics_flushed.clone()))?;

        Ok(Self {
            inner: Arc::new(StatsInner {
                collection_latency_seconds,
                runs_total,
                collection_errors_total,
                metrics_flushed,
            }),
        })
    }

    pub fn observe_collection_latency(&self, collector: &str, elapsed: Duration) {
        self.inner
            .collection_latency_seconds
            .with_label_values(&[collector])
            .observe(elapsed.as_secs_f64());
    }

    pub fn inc_runs(&self) {
        self.inner.runs_total.inc();
    }

    pub fn inc_collection_errors(&self, collector: &str) {
        self.inner
            .collection_errors_total
            .with_label_values(&[collector])
            .inc();
    }

    pub fn set_metrics_flushed(&self, count: usize) {
        self.inner.metrics_flushed.set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruments_register_and_record() {
        let registry = prometheus::Registry::new();
        let stats = AgentStats::new(&registry).unwrap();

        stats.observe_collection_latency("cpu", Duration::from_millis(2));
        stats.inc_runs();
        stats.inc_collection_errors("disk");
        stats.set_metrics_flushed(17);

        let families = registry.gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"host_agent_collection_latency_seconds"));
        assert!(names.contains(&"host_agent_runs_total"));
        assert!(names.contains(&"host_agent_collection_errors_total"));
        assert!(names.contains(&"host_agent_metrics_flushed"));
    }

    #[test]
    fn test_two_sinks_do_not_collide() {
        // Separate registries, separate instruments, no global registration.
        let first = prometheus::Registry::new();
        let second = prometheus::Registry::new();
        assert!(AgentStats::new(&first).is_ok());
        assert!(AgentStats::new(&second).is_ok());
    }
}
