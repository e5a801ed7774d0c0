//! Agent library for host metrics collection
//!
//! This crate provides the core functionality for:
//! - The collector contract, registry, and concurrent run engine
//! - The per-metric activation policy and resource filters
//! - The stream-tag codec embedded in metric names
//! - Builtin procfs and scrape collectors
//! - The receiver buffer for externally submitted metrics

pub mod activation;
pub mod collector;
pub mod metrics;
pub mod receiver;
pub mod settings;
pub mod stats;
pub mod tags;

pub use collector::{
    Collector, CollectorError, InventoryRecord, MetricBatch, Registry, RegistryError, RunCore,
};
pub use metrics::{Metric, MetricKind, MetricSet, MetricValue};
pub use receiver::Receiver;
pub use stats::AgentStats;
pub use tags::{
    encode_stream_tags, merge_tags, metric_name_with_stream_tags, prep_stream_tags, Tag, TagError,
};
