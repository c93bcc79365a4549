//! Per-server poll state shared by that server's database tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set-once flag: becomes `true` the first time any connection of the
/// server's batch passes its validity probe, and never goes back.
#[derive(Debug, Default)]
pub struct Liveness(AtomicBool);

impl Liveness {
    /// Marks the server alive. Returns `true` only for the call that flipped it.
    pub fn mark_alive(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Context of one server-level poll, created fresh every cycle.
#[derive(Debug)]
pub struct PollContext {
    server_name: String,
    metric_prefix: Arc<str>,
    liveness: Liveness,
}

impl PollContext {
    pub fn new(server_name: impl Into<String>, metric_prefix: Arc<str>) -> Self {
        Self {
            server_name: server_name.into(),
            metric_prefix,
            liveness: Liveness::default(),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn metric_prefix(&self) -> &Arc<str> {
        &self.metric_prefix
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }
}
