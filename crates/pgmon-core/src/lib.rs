//! pgmon-core — PostgreSQL query-to-metric collection engine.
//!
//! Provides:
//! - `config` — YAML configuration model, validation, column classification
//! - `connection` — connection descriptors for a (server, database) pair
//! - `collector` — the concurrent collection engine (fan-out, query runner,
//!   row translation) and its driver adapters
//! - `metrics` — metric records and sinks
//! - `error` — typed configuration and collection errors

pub mod collector;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;

pub use collector::{CycleSummary, Monitor, PollSummary};
pub use config::{DatabaseSpec, MonitorConfig, QuerySpec, ServerSpec};
pub use error::{CollectError, ConfigError};
pub use metrics::{MetricRecord, MetricSink};
