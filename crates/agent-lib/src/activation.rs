//! Metric activation policy
//!
//! Every collector resolves per-metric activity the same way: an explicit
//! enabled/disabled entry for the bare metric name wins, anything else falls
//! back to the collector's default-active flag. Enumerable resources (disk
//! devices, network interfaces, protocol names) are additionally gated by an
//! include/exclude regular-expression pair, independent of per-metric state.

use std::collections::HashMap;

use regex::Regex;

/// Include pattern used when a collector's settings name none: match all.
pub const DEFAULT_INCLUDE_PATTERN: &str = ".+";

/// Exclude pattern used when a collector's settings name none: match nothing.
pub const DEFAULT_EXCLUDE_PATTERN: &str = "^$";

/// Exclude pattern applied to network interfaces by default.
pub const DEFAULT_LOOPBACK_EXCLUDE: &str = "^lo$";

/// Per-collector metric enable/disable state, immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct MetricActivation {
    status: HashMap<String, bool>,
    default_active: bool,
}

impl MetricActivation {
    pub fn new(status: HashMap<String, bool>, default_active: bool) -> Self {
        Self {
            status,
            default_active,
        }
    }

    /// Activation state with no explicit entries and everything active.
    pub fn enabled_by_default() -> Self {
        Self {
            status: HashMap::new(),
            default_active: true,
        }
    }

    /// Resolves whether a candidate bare metric name should be emitted.
    pub fn is_active(&self, name: &str) -> bool {
        self.status.get(name).copied().unwrap_or(self.default_active)
    }
}

/// Include/exclude gate for enumerable resources.
///
/// A resource is skipped when it matches the exclude pattern or fails to
/// match the include pattern.
#[derive(Debug, Clone)]
pub struct ResourceFilter {
    include: Regex,
    exclude: Regex,
}

impl ResourceFilter {
    pub fn new(include: &str, exclude: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            include: Regex::new(include)?,
            exclude: Regex::new(exclude)?,
        })
    }

    pub fn allows(&self, name: &str) -> bool {
        !self.exclude.is_match(name) && self.include.is_match(name)
    }
}

impl Default for ResourceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_INCLUDE_PATTERN, DEFAULT_EXCLUDE_PATTERN)
            .expect("default filter patterns are valid")
    }
}
