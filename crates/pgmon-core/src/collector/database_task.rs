//! Collection task for one database.
//!
//! Runs every configured query of the database in order, accumulates the
//! metrics, and publishes them as a single batch. A database with a
//! non-empty query list always publishes exactly once, even when the batch
//! is empty; a database without queries publishes nothing.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::context::PollContext;
use super::join::{DynamicJoin, Participant};
use super::query_runner::QueryRunner;
use super::traits::Connector;
use crate::config::{DatabaseSpec, QuerySpec, classify_columns};
use crate::connection::ConnectionDescriptor;
use crate::metrics::{MetricRecord, MetricSink};

pub struct DatabaseTask {
    context: Arc<PollContext>,
    database: DatabaseSpec,
    descriptor: ConnectionDescriptor,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn MetricSink>,
    /// Join registration, taken at construction and released when the task ends.
    _participant: Participant,
}

impl DatabaseTask {
    /// Creates the task and registers it with `join` immediately, before it
    /// is handed to any executor.
    pub fn new(
        context: Arc<PollContext>,
        database: DatabaseSpec,
        descriptor: ConnectionDescriptor,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn MetricSink>,
        join: &DynamicJoin,
    ) -> Self {
        Self {
            context,
            database,
            descriptor,
            connector,
            sink,
            _participant: join.register(),
        }
    }

    pub fn db_name(&self) -> &str {
        &self.database.db_name
    }

    /// Runs the task to completion. Consumes the task, which deregisters it.
    pub fn run(self) {
        debug!(
            server = %self.context.server_name(),
            database = %self.database.db_name,
            "collecting metrics"
        );

        if self.database.queries.is_empty() {
            debug!(
                server = %self.context.server_name(),
                database = %self.database.db_name,
                "no queries configured"
            );
            return;
        }

        let metrics = self.collect();
        debug!(
            server = %self.context.server_name(),
            database = %self.database.db_name,
            metrics = metrics.len(),
            "publishing metrics"
        );
        self.sink.publish(metrics);
    }

    fn collect(&self) -> Vec<MetricRecord> {
        let runner = QueryRunner::new(
            self.connector.as_ref(),
            &self.descriptor,
            &self.context,
            &self.database.db_name,
        );

        let mut metrics = Vec::new();
        for (index, query) in self.database.queries.iter().enumerate() {
            metrics.extend(self.run_one(&runner, index, query));
        }
        metrics
    }

    fn run_one(&self, runner: &QueryRunner<'_>, index: usize, query: &QuerySpec) -> Vec<MetricRecord> {
        let server = self.context.server_name();
        let database = &self.database.db_name;

        if !query.server_level && query.name.is_none() {
            warn!(
                server = %server,
                database = %database,
                query = index + 1,
                "query name is required for non server level queries, skipping"
            );
            return Vec::new();
        }
        let label = query.name.as_deref().unwrap_or("<server-level>");

        let Some(statement) = query.statement.as_deref() else {
            warn!(server = %server, database = %database, query = %label, "queryStmt missing, skipping");
            return Vec::new();
        };

        if query.columns.is_empty() {
            debug!(server = %server, database = %database, query = %label, "no columns configured");
        }
        let columns = match classify_columns(&query.columns) {
            Ok(columns) => columns,
            Err(e) => {
                error!(server = %server, database = %database, query = %label, error = %e, "invalid columns, skipping");
                return Vec::new();
            }
        };

        runner.run_query(statement, query.server_level, query.name.as_deref(), &columns)
    }
}
