//! Abstractions over the database driver to enable testing and mocking.
//!
//! The collection engine only needs three things from a driver: open a
//! connection from a descriptor, probe that it is alive, and run a statement
//! returning a cursor whose values can be read as text by column name.
//! [`PgConnector`](super::PgConnector) implements them on top of the
//! `postgres` crate, [`MockConnector`](super::mock::MockConnector) in memory.

use std::time::Duration;

use crate::connection::ConnectionDescriptor;
use crate::error::CollectError;

/// Forward-only view over a result set.
pub trait Cursor {
    /// Advances to the next row. Returns `false` once the rows are exhausted.
    fn next(&mut self) -> Result<bool, CollectError>;

    /// Reads a column of the current row as text.
    ///
    /// `Ok(None)` means SQL NULL. A column that is not part of the result set
    /// is [`CollectError::MissingColumn`].
    fn get_string(&self, column: &str) -> Result<Option<&str>, CollectError>;
}

/// An open connection. Dropping it closes the connection.
pub trait Connection {
    /// Checks that the connection is usable, waiting at most `timeout`.
    fn is_valid(&mut self, timeout: Duration) -> Result<(), CollectError>;

    /// Executes `statement`. The cursor borrows the connection, so it is
    /// always released before the connection is.
    fn query(&mut self, statement: &str) -> Result<Box<dyn Cursor + '_>, CollectError>;
}

/// Opens connections. Shared by every database task of a cycle.
pub trait Connector: Send + Sync {
    fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Connection>, CollectError>;
}
