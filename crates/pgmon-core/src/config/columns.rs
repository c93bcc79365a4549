//! Column classification.
//!
//! Each configured column says which result-set column to read and whether
//! its value becomes part of the metric path (`metricPath`) or a leaf metric
//! value (`metricValue`). Any other keys are kept as metric properties.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use serde_yml::Value;

use crate::error::ConfigError;

/// Raw column descriptor as it appears in configuration.
pub type ColumnDescriptor = BTreeMap<String, Value>;

const NAME: &str = "name";
const TYPE: &str = "type";
const ROLE: &str = "role";
const ALIAS: &str = "alias";
const AGGREGATION_TYPE: &str = "aggregationType";
const TIME_ROLLUP_TYPE: &str = "timeRollUpType";
const CLUSTER_ROLLUP_TYPE: &str = "clusterRollUpType";
const MULTIPLIER: &str = "multiplier";
const DELTA: &str = "delta";

/// What a column contributes to a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// The value is appended to the metric path.
    PathSegment,
    /// The value is emitted as a leaf metric.
    Value,
}

impl FromStr for ColumnRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("metricpath") {
            Ok(ColumnRole::PathSegment)
        } else if s.eq_ignore_ascii_case("metricvalue") {
            Ok(ColumnRole::Value)
        } else {
            Err(())
        }
    }
}

/// Display and rollup metadata attached to a value column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricProperties {
    pub alias: Option<String>,
    pub aggregation_type: Option<String>,
    pub time_rollup_type: Option<String>,
    pub cluster_rollup_type: Option<String>,
    pub multiplier: Option<f64>,
    /// Report the difference from the previous cycle instead of the raw value.
    pub delta: bool,
    /// Keys without a dedicated field, stringified.
    pub other: BTreeMap<String, String>,
}

/// A classified column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub role: ColumnRole,
    pub properties: Option<Arc<MetricProperties>>,
}

impl ColumnSpec {
    /// Label used for the leaf of the metric path: the alias if set,
    /// otherwise the column name.
    pub fn label(&self) -> &str {
        self.properties
            .as_ref()
            .and_then(|p| p.alias.as_deref())
            .unwrap_or(&self.name)
    }
}

/// Classifies raw column descriptors, preserving their order.
///
/// Fails on the first malformed descriptor; nothing is silently dropped.
pub fn classify_columns(descriptors: &[ColumnDescriptor]) -> Result<Vec<ColumnSpec>, ConfigError> {
    descriptors
        .iter()
        .enumerate()
        .map(|(index, descriptor)| classify_column(index, descriptor))
        .collect()
}

fn classify_column(index: usize, descriptor: &ColumnDescriptor) -> Result<ColumnSpec, ConfigError> {
    let name = descriptor
        .get(NAME)
        .and_then(scalar_to_string)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ConfigError::MissingField {
            scope: format!("column #{}", index + 1),
            field: NAME,
        })?;

    let role_text = descriptor
        .get(TYPE)
        .or_else(|| descriptor.get(ROLE))
        .and_then(scalar_to_string)
        .ok_or_else(|| ConfigError::MissingField {
            scope: format!("column '{}'", name),
            field: TYPE,
        })?;
    let role = role_text
        .parse::<ColumnRole>()
        .map_err(|_| ConfigError::InvalidRole {
            column: name.clone(),
            role: role_text.clone(),
        })?;

    let mut properties = MetricProperties::default();
    let mut has_properties = false;

    for (key, value) in descriptor {
        if key == NAME || key == TYPE || key == ROLE {
            continue;
        }
        has_properties = true;

        let invalid = || ConfigError::InvalidProperty {
            column: name.clone(),
            key: key.clone(),
        };
        let text = scalar_to_string(value).ok_or_else(invalid)?;

        match key.as_str() {
            ALIAS => properties.alias = Some(text),
            AGGREGATION_TYPE => properties.aggregation_type = Some(text),
            TIME_ROLLUP_TYPE => properties.time_rollup_type = Some(text),
            CLUSTER_ROLLUP_TYPE => properties.cluster_rollup_type = Some(text),
            MULTIPLIER => {
                properties.multiplier = Some(text.trim().parse::<f64>().map_err(|_| invalid())?);
            }
            DELTA => {
                properties.delta = text.trim().parse::<bool>().map_err(|_| invalid())?;
            }
            _ => {
                properties.other.insert(key.clone(), text);
            }
        }
    }

    Ok(ColumnSpec {
        name,
        role,
        properties: has_properties.then(|| Arc::new(properties)),
    })
}

/// Renders a YAML scalar as text. Sequences and mappings have no text form.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        _ => None,
    }
}
