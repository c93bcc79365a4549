//! Metric sinks.

use std::io::{self, Write};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::MetricRecord;
use super::transform::{DeltaTracker, Transformed, transform};

const DEFAULT_AGGREGATION: &str = "AVERAGE";
const DEFAULT_TIME_ROLLUP: &str = "AVERAGE";
const DEFAULT_CLUSTER_ROLLUP: &str = "INDIVIDUAL";

/// Receives metric batches from database tasks.
///
/// `publish` is called at most once per database per cycle, from worker
/// threads, so implementations must be thread-safe.
pub trait MetricSink: Send + Sync {
    fn publish(&self, metrics: Vec<MetricRecord>);

    /// Called once after every server of a cycle has been polled.
    fn cycle_complete(&self) {}
}

/// Writes metrics in machine-agent line format:
/// `name=<path>,value=<v>,aggregator=<A>,time-rollup=<T>,cluster-rollup=<C>`.
pub struct MetricWriter<W: Write + Send> {
    out: Mutex<W>,
    deltas: Mutex<DeltaTracker>,
}

impl MetricWriter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> MetricWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            deltas: Mutex::new(DeltaTracker::new()),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn format_line(record: &MetricRecord, path: &str, value: i64) -> String {
        let props = record.properties();
        let aggregator = props
            .and_then(|p| p.aggregation_type.as_deref())
            .unwrap_or(DEFAULT_AGGREGATION);
        let time_rollup = props
            .and_then(|p| p.time_rollup_type.as_deref())
            .unwrap_or(DEFAULT_TIME_ROLLUP);
        let cluster_rollup = props
            .and_then(|p| p.cluster_rollup_type.as_deref())
            .unwrap_or(DEFAULT_CLUSTER_ROLLUP);
        format!(
            "name={},value={},aggregator={},time-rollup={},cluster-rollup={}",
            path, value, aggregator, time_rollup, cluster_rollup
        )
    }
}

impl<W: Write + Send> MetricSink for MetricWriter<W> {
    fn publish(&self, metrics: Vec<MetricRecord>) {
        let mut batch = String::new();
        {
            let mut deltas = self.deltas.lock();
            for record in &metrics {
                let path = record.path();
                match transform(record, &path, &mut deltas) {
                    Ok(Transformed::Report(value)) => {
                        batch.push_str(&Self::format_line(record, &path, value));
                        batch.push('\n');
                    }
                    Ok(Transformed::Baseline) => {
                        debug!(metric = %path, "delta baseline recorded");
                    }
                    Err(e) => warn!(metric = %path, "skipping metric: {}", e),
                }
            }
        }

        if batch.is_empty() {
            return;
        }

        // One write per batch, so a failing writer never sees a partial batch from us.
        let mut out = self.out.lock();
        if let Err(e) = out.write_all(batch.as_bytes()) {
            warn!(error = %e, "failed to write metrics batch");
            return;
        }
        if let Err(e) = out.flush() {
            warn!(error = %e, "failed to flush metrics");
        }
    }

    fn cycle_complete(&self) {
        self.deltas.lock().end_cycle();
    }
}
