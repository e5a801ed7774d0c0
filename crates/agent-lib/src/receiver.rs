//! Receiver buffer for externally submitted metrics
//!
//! External processes can push pre-built metric groups through the control
//! plane (`PUT /write/<group>`). Each group's latest submission replaces the
//! previous one; flushing returns the union of all groups without clearing,
//! mirroring how collector snapshots behave. In-memory only.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::metrics::MetricSet;

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("malformed metric payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

#[derive(Default)]
pub struct Receiver {
    groups: Mutex<HashMap<String, MetricSet>>,
}

impl Receiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a group's metric set from a JSON payload of
    /// `{name: {"_type": ..., "_value": ...}}` records. Names are prefixed
    /// with the group id. Returns the number of metrics stored.
    pub fn store(&self, group: &str, payload: serde_json::Value) -> Result<usize, ReceiverError> {
        let metrics: MetricSet = serde_json::from_value(payload)?;
        let prefixed: MetricSet = metrics
            .into_iter()
            .map(|(name, metric)| (format!("{}`{}", group, name), metric))
            .collect();
        let count = prefixed.len();

        let mut groups = self.groups.lock().expect("receiver lock poisoned");
        groups.insert(group.to_string(), prefixed);
        Ok(count)
    }

    /// Union of every group's last submission.
    pub fn flush(&self) -> MetricSet {
        let groups = self.groups.lock().expect("receiver lock poisoned");
        let mut merged = MetricSet::new();
        for set in groups.values() {
            merged.extend(set.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricValue;
    use serde_json::json;

    #[test]
    fn test_store_prefixes_and_flushes() {
        let receiver = Receiver::new();
        let stored = receiver
            .store("queue", json!({"depth": {"_type": "L", "_value": 12}}))
            .unwrap();
        assert_eq!(stored, 1);

        let flushed = receiver.flush();
        assert_eq!(flushed["queue`depth"].value, MetricValue::Uint(12));
    }

    #[test]
    fn test_store_replaces_previous_group() {
        let receiver = Receiver::new();
        receiver
            .store("queue", json!({"depth": {"_type": "L", "_value": 12}}))
            .unwrap();
        receiver
            .store("queue", json!({"lag": {"_type": "n", "_value": 0.5}}))
            .unwrap();

        let flushed = receiver.flush();
        assert_eq!(flushed.len(), 1);
        assert!(flushed.contains_key("queue`lag"));
    }

    #[test]
    fn test_groups_are_independent() {
        let receiver = Receiver::new();
        receiver
            .store("a", json!({"m": {"_type": "L", "_value": 1}}))
            .unwrap();
        receiver
            .store("b", json!({"m": {"_type": "L", "_value": 2}}))
            .unwrap();

        let flushed = receiver.flush();
        assert_eq!(flushed.len(), 2);
    }

    #[test]
    fn test_malformed_payload_is_rejected_without_mutation() {
        let receiver = Receiver::new();
        receiver
            .store("a", json!({"m": {"_type": "L", "_value": 1}}))
            .unwrap();

        let err = receiver.store("a", json!({"m": {"_value": "no type"}}));
        assert!(err.is_err());

        // The previous submission survives a rejected one.
        assert!(receiver.flush().contains_key("a`m"));
    }

    #[test]
    fn test_flush_does_not_clear() {
        let receiver = Receiver::new();
        receiver
            .store("a", json!({"m": {"_type": "L", "_value": 1}}))
            .unwrap();
        assert_eq!(receiver.flush().len(), 1);
        assert_eq!(receiver.flush().len(), 1);
    }
}
