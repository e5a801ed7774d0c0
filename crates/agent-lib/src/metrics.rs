//! Core metric model and wire shape
//!
//! A metric is a single observation: a closed kind discriminator, a value
//! payload, and a name that may carry embedded stream tags (see the `tags`
//! module). Downstream submission collaborators consume metrics as a JSON
//! mapping of name to `{"_type": <code>, "_value": <payload>}`; the
//! single-character type codes exist only at that serde boundary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Discriminator for the value payload of a [`Metric`].
///
/// Serialized as the external one-character type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    #[serde(rename = "i")]
    Int32,
    #[serde(rename = "I")]
    Uint32,
    #[serde(rename = "l")]
    Int64,
    #[serde(rename = "L")]
    Uint64,
    #[serde(rename = "n")]
    Double,
    #[serde(rename = "s")]
    Text,
    #[serde(rename = "h")]
    Histogram,
}

/// Value payload for a [`Metric`].
///
/// Untagged: the JSON representation is the bare number, string, or array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Uint(u64),
    Int(i64),
    Double(f64),
    Text(String),
    Samples(Vec<f64>),
}

/// A single observation, serialized as `{"_type": <code>, "_value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(rename = "_type")]
    pub kind: MetricKind,
    #[serde(rename = "_value")]
    pub value: MetricValue,
}

/// The unit a collector produces and the registry aggregates: a mapping from
/// (possibly tag-decorated) metric name to observation. Merging two sets is
/// `extend`; a later write for the same name wins silently.
pub type MetricSet = HashMap<String, Metric>;

impl Metric {
    pub fn int32(value: i32) -> Self {
        Self {
            kind: MetricKind::Int32,
            value: MetricValue::Int(value as i64),
        }
    }

    pub fn uint32(value: u32) -> Self {
        Self {
            kind: MetricKind::Uint32,
            value: MetricValue::Uint(value as u64),
        }
    }

    pub fn int64(value: i64) -> Self {
        Self {
            kind: MetricKind::Int64,
            value: MetricValue::Int(value),
        }
    }

    pub fn uint64(value: u64) -> Self {
        Self {
            kind: MetricKind::Uint64,
            value: MetricValue::Uint(value),
        }
    }

    pub fn double(value: f64) -> Self {
        Self {
            kind: MetricKind::Double,
            value: MetricValue::Double(value),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: MetricKind::Text,
            value: MetricValue::Text(value.into()),
        }
    }

    pub fn histogram(samples: Vec<f64>) -> Self {
        Self {
            kind: MetricKind::Histogram,
            value: MetricValue::Samples(samples),
        }
    }
}
