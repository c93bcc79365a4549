//! Error types for configuration and collection.
//!
//! Configuration errors abort the smallest enclosing scope (one server, one
//! database or one query). Collection errors are absorbed by the query runner
//! and never cross task boundaries.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration problems detected while loading or validating `config.yml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("{scope}: missing required field '{field}'")]
    MissingField { scope: String, field: &'static str },

    #[error("duplicate server displayName '{0}'")]
    DuplicateServer(String),

    #[error("server {0}: at least one database with a dbName is required")]
    NoDatabases(String),

    #[error("column '{column}': unknown type '{role}' (expected metricPath or metricValue)")]
    InvalidRole { column: String, role: String },

    #[error("column '{column}': invalid value for '{key}'")]
    InvalidProperty { column: String, key: String },

    #[error("server {server}: {message}")]
    Credentials { server: String, message: String },
}

/// Failures while talking to a database server.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection is not valid: {0}")]
    InvalidConnection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("column '{column}' is not present in the result set")]
    MissingColumn { column: String },
}
