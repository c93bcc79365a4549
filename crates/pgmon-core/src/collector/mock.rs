//! In-memory driver and sink doubles for testing the engine without a
//! database server.
//!
//! `MockConnector` serves canned result sets per statement (optionally per
//! database), can refuse connections, fail validity probes or statements,
//! and counts open connections so tests can check that resources are
//! released on every path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::traits::{Connection, Connector, Cursor};
use crate::connection::ConnectionDescriptor;
use crate::error::CollectError;
use crate::metrics::{MetricRecord, MetricSink};

/// A canned result set: column names plus rows of nullable text values.
#[derive(Debug, Clone, Default)]
pub struct MockResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl MockResultSet {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row; values line up with the columns given to `new`.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not have one entry per column. This is a test
    /// fixture, so a malformed row is a bug in the test itself.
    pub fn row(mut self, values: &[Option<&str>]) -> Self {
        assert_eq!(values.len(), self.columns.len(), "row width mismatch");
        self.rows
            .push(values.iter().map(|v| v.map(str::to_string)).collect());
        self
    }
}

#[derive(Debug, Clone)]
enum Response {
    Rows(MockResultSet),
    Error(String),
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    open: AtomicUsize,
}

/// Connector that serves canned responses.
#[derive(Debug, Default)]
pub struct MockConnector {
    responses: HashMap<String, Response>,
    database_responses: HashMap<(String, String), Response>,
    refused: HashSet<String>,
    invalid: HashSet<String>,
    delays: HashMap<String, Duration>,
    counters: Arc<Counters>,
    descriptors: Mutex<Vec<ConnectionDescriptor>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `result` for `statement` on every database.
    pub fn with_result(mut self, statement: &str, result: MockResultSet) -> Self {
        self.responses
            .insert(statement.to_string(), Response::Rows(result));
        self
    }

    /// Serves `result` for `statement` on `database` only.
    pub fn with_database_result(mut self, database: &str, statement: &str, result: MockResultSet) -> Self {
        self.database_responses.insert(
            (database.to_string(), statement.to_string()),
            Response::Rows(result),
        );
        self
    }

    /// Makes `statement` fail with a query error on every database.
    pub fn with_query_error(mut self, statement: &str, message: &str) -> Self {
        self.responses
            .insert(statement.to_string(), Response::Error(message.to_string()));
        self
    }

    /// Refuses connections to `database`.
    pub fn refuse(mut self, database: &str) -> Self {
        self.refused.insert(database.to_string());
        self
    }

    /// Connections to `database` open but fail the validity probe.
    pub fn invalid(mut self, database: &str) -> Self {
        self.invalid.insert(database.to_string());
        self
    }

    /// Delays every statement on `database`.
    pub fn with_delay(mut self, database: &str, delay: Duration) -> Self {
        self.delays.insert(database.to_string(), delay);
        self
    }

    /// Connections opened so far.
    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    pub fn open(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Descriptors passed to `connect`, in call order.
    pub fn descriptors(&self) -> Vec<ConnectionDescriptor> {
        self.descriptors.lock().clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Connection>, CollectError> {
        self.descriptors.lock().push(descriptor.clone());
        let database = descriptor.database().to_string();
        if self.refused.contains(&database) {
            return Err(CollectError::Connection(format!(
                "connection to {} refused",
                descriptor.url()
            )));
        }

        let mut responses = self.responses.clone();
        for ((db, statement), response) in &self.database_responses {
            if *db == database {
                responses.insert(statement.clone(), response.clone());
            }
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            valid: !self.invalid.contains(&database),
            delay: self.delays.get(&database).copied(),
            responses,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct MockConnection {
    valid: bool,
    delay: Option<Duration>,
    responses: HashMap<String, Response>,
    counters: Arc<Counters>,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.counters.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Connection for MockConnection {
    fn is_valid(&mut self, _timeout: Duration) -> Result<(), CollectError> {
        if self.valid {
            Ok(())
        } else {
            Err(CollectError::InvalidConnection("validity probe failed".to_string()))
        }
    }

    fn query(&mut self, statement: &str) -> Result<Box<dyn Cursor + '_>, CollectError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match self.responses.get(statement) {
            Some(Response::Rows(result)) => Ok(Box::new(MockCursor {
                result,
                position: None,
            })),
            Some(Response::Error(message)) => Err(CollectError::Query(message.clone())),
            None => Err(CollectError::Query(format!(
                "relation for statement '{}' does not exist",
                statement
            ))),
        }
    }
}

/// Cursor over a [`MockResultSet`].
pub struct MockCursor<'a> {
    result: &'a MockResultSet,
    position: Option<usize>,
}

impl<'a> MockCursor<'a> {
    pub fn new(result: &'a MockResultSet) -> Self {
        Self {
            result,
            position: None,
        }
    }
}

impl Cursor for MockCursor<'_> {
    fn next(&mut self) -> Result<bool, CollectError> {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(self.result.rows.len()));
        Ok(next < self.result.rows.len())
    }

    fn get_string(&self, column: &str) -> Result<Option<&str>, CollectError> {
        let index = self
            .result
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .ok_or_else(|| CollectError::MissingColumn {
                column: column.to_string(),
            })?;
        let row = self
            .position
            .and_then(|p| self.result.rows.get(p))
            .ok_or_else(|| CollectError::Query("cursor is not positioned on a row".to_string()))?;
        Ok(row[index].as_deref())
    }
}

/// Sink that keeps every published batch.
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<MetricRecord>>>,
    cycles: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<MetricRecord>> {
        self.batches.lock().clone()
    }

    /// All published records, flattened in publish order.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    pub fn completed_cycles(&self) -> usize {
        self.cycles.load(Ordering::SeqCst)
    }
}

impl MetricSink for RecordingSink {
    fn publish(&self, metrics: Vec<MetricRecord>) {
        self.batches.lock().push(metrics);
    }

    fn cycle_complete(&self) {
        self.cycles.fetch_add(1, Ordering::SeqCst);
    }
}
