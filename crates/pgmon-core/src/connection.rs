//! Connection descriptors.
//!
//! A descriptor is the (URL, properties) pair for one database on one
//! server. The collection engine treats it as opaque and only hands it to a
//! [`Connector`](crate::collector::Connector); the PostgreSQL adapter renders
//! it as a libpq key/value connection string.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::ServerSpec;

const URL_SCHEME: &str = "postgresql:";
const READ_ONLY_OPTIONS: &str = "-c default_transaction_read_only=on";

pub const USER: &str = "user";
pub const PASSWORD: &str = "password";
pub const APPLICATION_NAME: &str = "application_name";
pub const OPTIONS: &str = "options";

/// Builds `postgresql://host:port/database`, bracketing IPv6 hosts.
pub fn build_url(scheme: &str, host: &str, port: u16, database: &str, use_ipv6: bool) -> String {
    let host = if use_ipv6 && !(host.starts_with('[') && host.ends_with(']')) {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    format!("{}//{}:{}/{}", scheme, host, port, database)
}

/// Where and how to connect for one (server, database) pair.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    url: String,
    host: String,
    port: u16,
    database: String,
    properties: BTreeMap<String, String>,
}

impl ConnectionDescriptor {
    /// Builds the descriptor for `database` on `server`.
    ///
    /// Sessions are read-only. Optional connection properties from the
    /// server entry are applied last and may override the defaults.
    pub fn for_database(server: &ServerSpec, database: &str, password: Option<&str>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(USER.to_string(), server.user.clone());
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            properties.insert(PASSWORD.to_string(), password.to_string());
        }
        properties.insert(APPLICATION_NAME.to_string(), server.application_name.clone());
        properties.insert(OPTIONS.to_string(), READ_ONLY_OPTIONS.to_string());
        properties.extend(server.properties.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            url: build_url(URL_SCHEME, &server.host, server.port, database, server.use_ipv6),
            host: server.host.trim_matches(|c| c == '[' || c == ']').to_string(),
            port: server.port,
            database: database.to_string(),
            properties,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Renders a libpq key/value connection string.
    pub fn connection_string(&self) -> String {
        let mut parts = vec![
            format!("host={}", quote(&self.host)),
            format!("port={}", self.port),
            format!("dbname={}", quote(&self.database)),
        ];
        parts.extend(
            self.properties
                .iter()
                .map(|(k, v)| format!("{}={}", k, quote(v))),
        );
        parts.join(" ")
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let properties: BTreeMap<&str, &str> = self
            .properties
            .iter()
            .map(|(k, v)| {
                if k == PASSWORD {
                    (k.as_str(), "***")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("ConnectionDescriptor")
            .field("url", &self.url)
            .field("properties", &properties)
            .finish()
    }
}

/// Quotes a libpq value when it is empty or contains spaces, quotes or backslashes.
fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}
