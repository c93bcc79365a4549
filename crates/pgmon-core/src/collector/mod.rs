//! Concurrent metric collection engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Monitor::run_cycle                                           │
//! │   one scoped thread per server ─► Monitor::poll_server       │
//! │                                     │ register self          │
//! │                                     │ per database:          │
//! │                                     │   DatabaseTask::new ── register
//! │                                     │   Executor::execute    │
//! │                                     │ arrive and await       │
//! │                                     ▼                        │
//! │   worker pool ─► DatabaseTask::run                           │
//! │                    per query: QueryRunner ─► RowTranslator   │
//! │                    MetricSink::publish (one batch)           │
//! │                    drop ── deregister                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Servers are polled on threads owned by the cycle, database tasks on the
//! injected [`Executor`]. Blocking coordinators therefore never occupy pool
//! workers, and a bounded pool cannot deadlock on itself.
//!
//! The only state shared between tasks is the per-server [`Liveness`] flag.
//! Metric lists stay task-local until they are handed to the sink.

mod context;
mod coordinator;
mod database_task;
mod executor;
mod join;
pub mod mock;
mod postgres;
mod query_runner;
mod traits;
mod translator;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::config::{DEFAULT_METRIC_PREFIX, PasswordDecryptor, ServerSpec};
use crate::error::ConfigError;
use crate::metrics::MetricSink;

pub use context::{Liveness, PollContext};
pub use coordinator::PollSummary;
pub use database_task::DatabaseTask;
pub use executor::{Executor, InlineExecutor, Job, ThreadExecutor};
pub use join::{DynamicJoin, Participant};
pub use postgres::PgConnector;
pub use query_runner::{QueryRunner, VALIDITY_TIMEOUT};
pub use traits::{Connection, Connector, Cursor};
pub use translator::RowTranslator;

/// Outcome of one polling cycle across all servers.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub servers: Vec<PollSummary>,
    /// Servers skipped for configuration errors or whose poll aborted or panicked.
    pub failed: usize,
    pub duration: Duration,
}

impl CycleSummary {
    pub fn alive(&self) -> usize {
        self.servers.iter().filter(|s| s.alive).count()
    }
}

/// Drives polling cycles.
///
/// Holds the collaborators shared by every poll: the driver, the sink,
/// the worker pool and an optional password decryptor.
pub struct Monitor {
    connector: Arc<dyn Connector>,
    sink: Arc<dyn MetricSink>,
    executor: Arc<dyn Executor>,
    decryptor: Option<Arc<dyn PasswordDecryptor>>,
    metric_prefix: Arc<str>,
    poll_timeout: Option<Duration>,
}

impl Monitor {
    pub fn new(connector: Arc<dyn Connector>, sink: Arc<dyn MetricSink>, executor: Arc<dyn Executor>) -> Self {
        Self {
            connector,
            sink,
            executor,
            decryptor: None,
            metric_prefix: Arc::from(DEFAULT_METRIC_PREFIX),
            poll_timeout: None,
        }
    }

    pub fn with_metric_prefix(mut self, prefix: &str) -> Self {
        self.metric_prefix = Arc::from(prefix);
        self
    }

    /// Bounds how long a server poll waits for its database tasks.
    /// `None` waits indefinitely.
    pub fn with_poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_decryptor(mut self, decryptor: Arc<dyn PasswordDecryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    /// Runs one polling cycle.
    ///
    /// Invalid server entries are logged and skipped. Every valid server is
    /// polled on its own scoped thread; the call returns once all of them
    /// are done, then tells the sink the cycle is complete.
    pub fn run_cycle(&self, servers: Vec<Result<ServerSpec, ConfigError>>) -> CycleSummary {
        let started = Instant::now();
        let mut summary = CycleSummary::default();

        let mut valid = Vec::new();
        for server in servers {
            match server {
                Ok(spec) => valid.push(spec),
                Err(e) => {
                    error!(error = %e, "invalid server configuration, skipping");
                    summary.failed += 1;
                }
            }
        }

        thread::scope(|scope| {
            let handles: Vec<_> = valid
                .iter()
                .filter_map(|server| {
                    thread::Builder::new()
                        .name(format!("pgmon server - {}", server.display_name))
                        .spawn_scoped(scope, move || self.poll_server(server))
                        .map_err(|e| {
                            error!(server = %server.display_name, error = %e, "failed to spawn server poll");
                            summary.failed += 1;
                        })
                        .ok()
                        .map(|handle| (server.display_name.as_str(), handle))
                })
                .collect();

            for (server, handle) in handles {
                match handle.join() {
                    Ok(Ok(poll)) => summary.servers.push(poll),
                    Ok(Err(e)) => {
                        error!(server = %server, error = %e, "server poll aborted");
                        summary.failed += 1;
                    }
                    Err(_) => {
                        error!(server = %server, "server poll panicked");
                        summary.failed += 1;
                    }
                }
            }
        });

        self.sink.cycle_complete();
        summary.duration = started.elapsed();
        info!(
            servers = summary.servers.len(),
            alive = summary.alive(),
            failed = summary.failed,
            duration_ms = summary.duration.as_millis() as u64,
            "polling cycle complete"
        );
        summary
    }
}
