//! Metric records and the sinks that receive them.

mod sink;
mod transform;

use std::sync::Arc;

use crate::config::MetricProperties;

pub use sink::{MetricSink, MetricWriter};
pub use transform::DeltaTracker;

/// Separator between metric path tokens.
pub const METRIC_SEPARATOR: &str = "|";

/// Leaf name of the per-server liveness metric.
pub const HEART_BEAT: &str = "HEART_BEAT";

/// One metric value at a hierarchical path.
///
/// The path is `prefix | tokens...`; the last token is the metric's display
/// name. Records are immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    prefix: Arc<str>,
    tokens: Vec<String>,
    column: String,
    value: String,
    properties: Option<Arc<MetricProperties>>,
}

impl MetricRecord {
    /// `tokens` must be non-empty; its last element is the leaf label.
    pub fn new(
        prefix: Arc<str>,
        tokens: Vec<String>,
        column: impl Into<String>,
        value: impl Into<String>,
        properties: Option<Arc<MetricProperties>>,
    ) -> Self {
        debug_assert!(!tokens.is_empty());
        Self {
            prefix,
            tokens,
            column: column.into(),
            value: value.into(),
            properties,
        }
    }

    /// Server-level heart-beat: `1` when a connection was validated this cycle.
    pub fn heart_beat(prefix: Arc<str>, server: &str, alive: bool) -> Self {
        let value = if alive { "1" } else { "0" };
        Self::new(
            prefix,
            vec![server.to_string(), HEART_BEAT.to_string()],
            HEART_BEAT,
            value,
            None,
        )
    }

    /// Path tokens below the prefix, ending with the leaf label.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Display name (alias or column name).
    pub fn name(&self) -> &str {
        self.tokens.last().map(String::as_str).unwrap_or_default()
    }

    /// Result-set column the value was read from.
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn properties(&self) -> Option<&MetricProperties> {
        self.properties.as_deref()
    }

    /// Full `|`-separated path including the prefix.
    pub fn path(&self) -> String {
        let prefix = self.prefix.trim_end_matches(METRIC_SEPARATOR);
        let tokens = self.tokens.join(METRIC_SEPARATOR);
        if prefix.is_empty() {
            tokens
        } else {
            format!("{}{}{}", prefix, METRIC_SEPARATOR, tokens)
        }
    }
}
