//! Executes one query and turns its rows into metrics.
//!
//! Every failure is absorbed here: the query contributes zero metrics, the
//! error is logged, and sibling queries and databases are unaffected.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::{debug, error};

use super::context::PollContext;
use super::traits::Connector;
use super::translator::RowTranslator;
use crate::config::ColumnSpec;
use crate::connection::ConnectionDescriptor;
use crate::error::CollectError;
use crate::metrics::MetricRecord;

/// Upper bound on the connection validity probe.
pub const VALIDITY_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs queries against one database.
pub struct QueryRunner<'a> {
    connector: &'a dyn Connector,
    descriptor: &'a ConnectionDescriptor,
    context: &'a PollContext,
    db_name: &'a str,
}

impl<'a> QueryRunner<'a> {
    pub fn new(
        connector: &'a dyn Connector,
        descriptor: &'a ConnectionDescriptor,
        context: &'a PollContext,
        db_name: &'a str,
    ) -> Self {
        Self {
            connector,
            descriptor,
            context,
            db_name,
        }
    }

    /// Runs `statement` on a fresh connection.
    ///
    /// `query_name` is required unless `server_level` is set. Returns no
    /// metrics on any connection, SQL or translation failure.
    pub fn run_query(
        &self,
        statement: &str,
        server_level: bool,
        query_name: Option<&str>,
        columns: &[ColumnSpec],
    ) -> Vec<MetricRecord> {
        let label = query_name.unwrap_or("<server-level>");
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.try_run_query(statement, server_level, query_name, columns)
        }));

        match result {
            Ok(Ok(metrics)) => {
                debug!(
                    server = %self.context.server_name(),
                    database = %self.db_name,
                    query = %label,
                    metrics = metrics.len(),
                    "executed query"
                );
                metrics
            }
            Ok(Err(e)) => {
                error!(
                    server = %self.context.server_name(),
                    database = %self.db_name,
                    query = %label,
                    error = %e,
                    "query produced no metrics"
                );
                Vec::new()
            }
            Err(_) => {
                error!(
                    server = %self.context.server_name(),
                    database = %self.db_name,
                    query = %label,
                    "unexpected panic while running query"
                );
                Vec::new()
            }
        }
    }

    fn try_run_query(
        &self,
        statement: &str,
        server_level: bool,
        query_name: Option<&str>,
        columns: &[ColumnSpec],
    ) -> Result<Vec<MetricRecord>, CollectError> {
        let mut connection = self.connector.connect(self.descriptor)?;
        connection.is_valid(VALIDITY_TIMEOUT)?;
        if self.context.liveness().mark_alive() {
            debug!(server = %self.context.server_name(), "server is alive");
        }

        let prefix = self.context.metric_prefix();
        let server = self.context.server_name();
        let translator = match (server_level, query_name) {
            (true, _) => RowTranslator::server_level(prefix, server, columns),
            (false, Some(name)) => RowTranslator::new(prefix, server, self.db_name, name, columns),
            (false, None) => {
                return Err(CollectError::Query(
                    "query name is required for non server level queries".to_string(),
                ));
            }
        };

        let mut cursor = connection.query(statement)?;
        translator.translate_all(cursor.as_mut())
    }
}
