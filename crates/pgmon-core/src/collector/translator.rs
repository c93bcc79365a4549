//! Row-to-metric translation.
//!
//! For each row the metric path starts with the server name, then (unless the
//! query is server-level) the database and query names, then the values of
//! every `metricPath` column in declaration order. Each non-null
//! `metricValue` column then yields one metric whose leaf is the column's
//! label. Values are staged until all path segments of the row are known, so
//! a path column declared after a value column still lands in that value's
//! path.

use std::sync::Arc;

use super::traits::Cursor;
use crate::config::{ColumnRole, ColumnSpec};
use crate::error::CollectError;
use crate::metrics::MetricRecord;

/// Translates result rows of one query into metric records.
#[derive(Debug)]
pub struct RowTranslator<'a> {
    prefix: &'a Arc<str>,
    server_name: &'a str,
    /// `(database, query)` for per-database queries, `None` for server-level.
    scope: Option<(&'a str, &'a str)>,
    columns: &'a [ColumnSpec],
}

impl<'a> RowTranslator<'a> {
    /// Translator for a per-database query: paths include database and query name.
    pub fn new(
        prefix: &'a Arc<str>,
        server_name: &'a str,
        db_name: &'a str,
        query_name: &'a str,
        columns: &'a [ColumnSpec],
    ) -> Self {
        Self {
            prefix,
            server_name,
            scope: Some((db_name, query_name)),
            columns,
        }
    }

    /// Translator for a server-level query: paths omit database and query name.
    pub fn server_level(prefix: &'a Arc<str>, server_name: &'a str, columns: &'a [ColumnSpec]) -> Self {
        Self {
            prefix,
            server_name,
            scope: None,
            columns,
        }
    }

    /// Drains the cursor. A missing column fails the whole query, so no
    /// partial results are returned.
    pub fn translate_all(&self, cursor: &mut dyn Cursor) -> Result<Vec<MetricRecord>, CollectError> {
        let mut metrics = Vec::new();
        let mut tokens = Vec::new();
        while cursor.next()? {
            self.translate_row(&*cursor, &mut tokens, &mut metrics)?;
        }
        Ok(metrics)
    }

    /// Translates the current row, appending to `out`.
    ///
    /// `tokens` is scratch space; it is cleared on entry.
    pub fn translate_row(
        &self,
        cursor: &dyn Cursor,
        tokens: &mut Vec<String>,
        out: &mut Vec<MetricRecord>,
    ) -> Result<(), CollectError> {
        tokens.clear();
        tokens.push(self.server_name.to_string());
        if let Some((db_name, query_name)) = self.scope {
            tokens.push(db_name.to_string());
            tokens.push(query_name.to_string());
        }

        let mut staged: Vec<(&ColumnSpec, String)> = Vec::new();
        for column in self.columns {
            let Some(value) = cursor.get_string(&column.name)? else {
                continue;
            };
            match column.role {
                ColumnRole::PathSegment => tokens.push(value.to_string()),
                ColumnRole::Value => staged.push((column, value.to_string())),
            }
        }

        for (column, value) in staged {
            tokens.push(column.label().to_string());
            out.push(MetricRecord::new(
                Arc::clone(self.prefix),
                tokens.clone(),
                column.name.clone(),
                value,
                column.properties.clone(),
            ));
            tokens.pop();
        }
        Ok(())
    }
}
