//! PostgreSQL driver adapter.
//!
//! Statements run through the simple query protocol, which returns every
//! value in text form. That matches the engine's "read the column as a
//! string" contract without per-type decoding.

use std::time::Duration;

use postgres::{Client, NoTls, SimpleQueryMessage, SimpleQueryRow};
use tracing::debug;

use super::traits::{Connection, Connector, Cursor};
use crate::connection::ConnectionDescriptor;
use crate::error::CollectError;

/// Opens blocking `postgres` clients without TLS.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgConnector;

impl PgConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for PgConnector {
    fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Connection>, CollectError> {
        debug!(url = %descriptor.url(), "connecting");
        let client = Client::connect(&descriptor.connection_string(), NoTls)
            .map_err(|e| CollectError::Connection(format_postgres_error(&e)))?;
        Ok(Box::new(PgConnection { client }))
    }
}

struct PgConnection {
    client: Client,
}

impl Connection for PgConnection {
    fn is_valid(&mut self, timeout: Duration) -> Result<(), CollectError> {
        self.client
            .is_valid(timeout)
            .map_err(|e| CollectError::InvalidConnection(format_postgres_error(&e)))
    }

    fn query(&mut self, statement: &str) -> Result<Box<dyn Cursor + '_>, CollectError> {
        let rows = self
            .client
            .simple_query(statement)
            .map_err(|e| CollectError::Query(format_postgres_error(&e)))?
            .into_iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .collect();
        Ok(Box::new(PgCursor {
            rows,
            position: None,
        }))
    }
}

struct PgCursor {
    rows: Vec<SimpleQueryRow>,
    position: Option<usize>,
}

impl Cursor for PgCursor {
    fn next(&mut self) -> Result<bool, CollectError> {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    fn get_string(&self, column: &str) -> Result<Option<&str>, CollectError> {
        let row = self
            .position
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| CollectError::Query("cursor is not positioned on a row".to_string()))?;
        let index = row
            .columns()
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(column))
            .ok_or_else(|| CollectError::MissingColumn {
                column: column.to_string(),
            })?;
        row.try_get(index)
            .map_err(|e| CollectError::Query(format_postgres_error(&e)))
    }
}

/// Shortens driver errors for logs.
pub(crate) fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else if msg.contains("does not exist") {
            msg.split("FATAL:")
                .last()
                .unwrap_or(&msg)
                .trim()
                .to_string()
        } else {
            msg
        }
    }
}
