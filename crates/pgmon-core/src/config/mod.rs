//! Monitor configuration.
//!
//! The YAML document (`config.yml`) is deserialized into raw `*Config` structs
//! that tolerate the loose typing of the deployed format, then validated into
//! immutable `*Spec` values that the collection engine consumes. Validation
//! is per server: a broken server entry never prevents the others from being
//! polled.

mod columns;
mod credentials;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub use columns::{ColumnDescriptor, ColumnRole, ColumnSpec, MetricProperties, classify_columns};
pub use credentials::{Credential, PasswordDecryptor};

pub const DEFAULT_METRIC_PREFIX: &str = "Custom Metrics|PostgreSQL";
pub const DEFAULT_APPLICATION_NAME: &str = "pgmond";
const DEFAULT_NUMBER_OF_THREADS: usize = 5;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Scalar that the deployed format writes either quoted or bare.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_text(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }

    /// `"true"` in any case is true; everything else is false.
    pub fn is_true(&self) -> bool {
        match self {
            Scalar::Bool(b) => *b,
            Scalar::Text(s) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,
    #[serde(default = "default_number_of_threads")]
    pub number_of_threads: usize,
    /// Seconds between polling cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Optional upper bound, in seconds, on the wait for one server's databases.
    #[serde(default)]
    pub poll_timeout: Option<u64>,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

fn default_metric_prefix() -> String {
    DEFAULT_METRIC_PREFIX.to_string()
}

fn default_number_of_threads() -> usize {
    DEFAULT_NUMBER_OF_THREADS
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub display_name: Option<String>,
    pub host: Option<String>,
    pub port: Option<Scalar>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub encrypted_password: Option<String>,
    pub encryption_key: Option<String>,
    pub use_ipv6: Option<Scalar>,
    pub application_name: Option<String>,
    #[serde(default)]
    pub optional_connection_properties: BTreeMap<String, Scalar>,
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub db_name: Option<String>,
    #[serde(default)]
    pub queries: Vec<QueryConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    pub name: Option<String>,
    pub server_lvl_query: Option<Scalar>,
    pub query_stmt: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
}

/// A validated database server.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub display_name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credential: Credential,
    pub use_ipv6: bool,
    pub application_name: String,
    pub properties: BTreeMap<String, String>,
    pub databases: Vec<DatabaseSpec>,
}

/// A database on a server. An empty `db_name` is skipped at scheduling time.
#[derive(Debug, Clone, Default)]
pub struct DatabaseSpec {
    pub db_name: String,
    pub queries: Vec<QuerySpec>,
}

/// One configured query. Columns stay raw until the database task classifies
/// them, so a malformed column only affects its own query.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub name: Option<String>,
    pub server_level: bool,
    pub statement: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
}

impl MonitorConfig {
    /// Reads and parses a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(content)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout.map(Duration::from_secs)
    }

    /// Validates every server entry independently.
    ///
    /// Display names must be unique; the first occurrence wins and later
    /// duplicates are reported as errors.
    pub fn server_specs(&self) -> Vec<Result<ServerSpec, ConfigError>> {
        let mut seen = HashSet::new();
        self.servers
            .iter()
            .map(|server| {
                let spec = server.to_spec()?;
                if !seen.insert(spec.display_name.clone()) {
                    return Err(ConfigError::DuplicateServer(spec.display_name));
                }
                Ok(spec)
            })
            .collect()
    }
}

impl ServerConfig {
    pub fn to_spec(&self) -> Result<ServerSpec, ConfigError> {
        let display_name = non_empty(self.display_name.as_deref()).ok_or_else(|| {
            ConfigError::MissingField {
                scope: "server".to_string(),
                field: "displayName",
            }
        })?;
        let scope = || format!("server {}", display_name);

        let host = non_empty(self.host.as_deref()).ok_or_else(|| ConfigError::MissingField {
            scope: scope(),
            field: "host",
        })?;
        let port_text = self
            .port
            .as_ref()
            .map(Scalar::as_text)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                scope: scope(),
                field: "port",
            })?;
        let port = port_text
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidProperty {
                column: scope(),
                key: "port".to_string(),
            })?;
        let user = non_empty(self.user.as_deref()).ok_or_else(|| ConfigError::MissingField {
            scope: scope(),
            field: "user",
        })?;

        if !self
            .databases
            .iter()
            .any(|db| non_empty(db.db_name.as_deref()).is_some())
        {
            return Err(ConfigError::NoDatabases(display_name));
        }

        let databases = self
            .databases
            .iter()
            .map(|db| DatabaseSpec {
                db_name: db.db_name.clone().unwrap_or_default(),
                queries: db.queries.iter().map(QueryConfig::to_spec).collect(),
            })
            .collect();

        Ok(ServerSpec {
            credential: Credential::from_fields(
                self.password.as_deref(),
                self.encrypted_password.as_deref(),
                self.encryption_key.as_deref(),
            ),
            use_ipv6: self.use_ipv6.as_ref().is_some_and(Scalar::is_true),
            application_name: non_empty(self.application_name.as_deref())
                .unwrap_or_else(|| DEFAULT_APPLICATION_NAME.to_string()),
            properties: self
                .optional_connection_properties
                .iter()
                .map(|(k, v)| (k.clone(), v.as_text()))
                .collect(),
            display_name,
            host,
            port,
            user,
            databases,
        })
    }
}

impl QueryConfig {
    fn to_spec(&self) -> QuerySpec {
        QuerySpec {
            name: non_empty(self.name.as_deref()),
            server_level: self.server_lvl_query.as_ref().is_some_and(Scalar::is_true),
            statement: non_empty(self.query_stmt.as_deref()),
            columns: self.columns.clone(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
