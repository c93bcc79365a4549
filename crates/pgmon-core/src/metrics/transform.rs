//! Value transforms applied by the metric writer: multiplier and delta.

use std::collections::HashMap;

use super::MetricRecord;

/// Previous-cycle values for delta metrics, keyed by full metric path.
///
/// Values observed during a cycle become the baseline for the next one when
/// [`end_cycle`](Self::end_cycle) runs; the old baseline is discarded whole.
#[derive(Debug, Default)]
pub struct DeltaTracker {
    previous: HashMap<String, f64>,
    current: HashMap<String, f64>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for this cycle and returns the change since the last
    /// cycle, or `None` on first sight.
    pub fn observe(&mut self, path: &str, value: f64) -> Option<f64> {
        self.current.insert(path.to_string(), value);
        self.previous.get(path).map(|prev| value - prev)
    }

    pub fn end_cycle(&mut self) {
        self.previous = std::mem::take(&mut self.current);
    }
}

/// Outcome of transforming one record.
#[derive(Debug, PartialEq)]
pub(crate) enum Transformed {
    Report(i64),
    /// First observation of a delta metric.
    Baseline,
}

/// Parses the raw value and applies delta then multiplier, rounding to an integer.
pub(crate) fn transform(record: &MetricRecord, path: &str, deltas: &mut DeltaTracker) -> Result<Transformed, String> {
    let raw = record
        .value()
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("non-numeric value '{}'", record.value()))?;

    let props = record.properties();
    let mut value = raw;
    if props.is_some_and(|p| p.delta) {
        match deltas.observe(path, raw) {
            Some(d) => value = d,
            None => return Ok(Transformed::Baseline),
        }
    }
    if let Some(multiplier) = props.and_then(|p| p.multiplier) {
        value *= multiplier;
    }
    let rounded = value.round();
    // `i64::MAX as f64` is 2^63, one past the largest i64.
    if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
        return Err(format!("value '{}' is not representable as an integer", record.value()));
    }
    Ok(Transformed::Report(rounded as i64))
}
