//! Column discovery.
//!
//! Learns which physical columns a logical table has. The store's catalog is
//! asked first; without one, a single row is sampled; an empty table falls
//! back to the logical table's fixed minimal column set. Nothing is cached:
//! every call re-reads the store.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, warn};

use super::candidates::LogicalTable;
use super::resolver::ResolvedColumns;
use crate::error::{Error, Result};
use crate::store::{Select, Store};
use crate::value::{Row, Value};

/// Where a table's column set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSource {
    Catalog,
    Sample,
    Fallback,
}

/// Discovered shape of a logical table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableShape {
    /// Physical table that resolved.
    pub table: String,
    pub columns: BTreeSet<String>,
    pub source: ColumnSource,
    /// Semantic keys resolved against `columns`.
    pub resolved: ResolvedColumns,
}

impl TableShape {
    pub fn has(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Physical column for a semantic key.
    pub fn column(&self, key: &str) -> Option<&str> {
        self.resolved.get(key)
    }
}

/// Discover the shape of `logical`.
///
/// Candidate tables are tried in order. Only a recognized missing-table error
/// moves on to the next candidate; any other error is returned unchanged.
/// When no candidate exists the result is [`Error::NotFound`].
pub async fn describe(store: &dyn Store, logical: &LogicalTable) -> Result<TableShape> {
    for table in logical.table_candidates {
        match store.describe_table(table).await {
            Ok(Some(columns)) if !columns.is_empty() => {
                debug!(logical = logical.name, table, "columns from catalog");
                return Ok(shape(logical, table, columns, ColumnSource::Catalog));
            }
            Ok(_) => {}
            Err(error) => {
                warn!(logical = logical.name, table, %error, "catalog lookup failed, sampling instead");
            }
        }

        match store.select(Select::from(*table).limit(1)).await {
            Ok(rows) => {
                return Ok(match rows.into_iter().next() {
                    Some(row) => {
                        let columns = row.into_keys().collect();
                        shape(logical, table, columns, ColumnSource::Sample)
                    }
                    None => {
                        debug!(logical = logical.name, table, "table is empty, using fallback columns");
                        let columns = logical.fallback_columns.iter().map(|c| c.to_string()).collect();
                        shape(logical, table, columns, ColumnSource::Fallback)
                    }
                });
            }
            Err(error) if error.is_missing_table() => {
                debug!(logical = logical.name, table, "candidate table missing");
            }
            Err(error) => return Err(error.into()),
        }
    }

    Err(Error::NotFound(format!(
        "no table for {} (tried {})",
        logical.name,
        logical.table_candidates.join(", ")
    )))
}

/// Physical table name for `logical`.
pub async fn resolve_table(store: &dyn Store, logical: &LogicalTable) -> Result<String> {
    Ok(describe(store, logical).await?.table)
}

/// Columns of an arbitrary table, `None` when it has no rows and no catalog
/// entry. Missing tables are `None` as well.
pub async fn discover_columns(store: &dyn Store, table: &str) -> Result<Option<BTreeSet<String>>> {
    match store.describe_table(table).await {
        Ok(Some(columns)) if !columns.is_empty() => return Ok(Some(columns)),
        Ok(_) => {}
        Err(error) => warn!(table, %error, "catalog lookup failed, sampling instead"),
    }
    match store.select(Select::from(table).limit(1)).await {
        Ok(rows) => Ok(rows.into_iter().next().map(|row| row.into_keys().collect())),
        Err(error) if error.is_missing_table() => {
            debug!(table, "table missing");
            Ok(None)
        }
        Err(error) => Err(error.into()),
    }
}

fn shape(logical: &LogicalTable, table: &str, columns: BTreeSet<String>, source: ColumnSource) -> TableShape {
    TableShape {
        table: table.to_string(),
        resolved: logical.columns.resolve(&columns),
        columns,
        source,
    }
}

/// Columns a write may never set.
pub const DEFAULT_WRITE_DENY: &[&str] = &["id", "created_at", "updated_at"];

/// Keep only keys of `input` that exist in `columns` and are not denied.
pub fn pick_writable_columns(columns: &BTreeSet<String>, input: &Row, deny: &[&str]) -> Row {
    input
        .iter()
        .filter(|(key, _)| columns.contains(key.as_str()))
        .filter(|(key, _)| !DEFAULT_WRITE_DENY.contains(&key.as_str()) && !deny.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect::<Row>()
}

/// Map semantic keys of `input` onto physical columns of `shape`.
///
/// Keys without a resolved column are dropped, then the result goes through
/// [`pick_writable_columns`].
pub fn map_semantic_input(shape: &TableShape, input: &[(&str, Value)], deny: &[&str]) -> Row {
    let mapped: Row = input
        .iter()
        .filter_map(|(key, value)| shape.column(key).map(|col| (col.to_string(), value.clone())))
        .collect();
    pick_writable_columns(&shape.columns, &mapped, deny)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::schema::candidates::{STATUSES, TAGS};
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_falls_through_missing_candidate() {
        let store = MemoryStore::new().with_json_table(
            "status",
            json!([{"id": 1, "status_name": "Active", "background_color": "#0f0"}]),
        );
        let shape = describe(&store, &STATUSES).await.unwrap();
        assert_eq!(shape.table, "status");
        assert_eq!(shape.source, ColumnSource::Sample);
        assert_eq!(shape.column("name"), Some("status_name"));
        assert_eq!(shape.column("color"), Some("background_color"));
        assert_eq!(shape.column("code"), None);
        assert_eq!(store.selects_on("statuses"), 1);
    }

    #[tokio::test]
    async fn test_empty_status_table_uses_fallback() {
        let store = MemoryStore::new().with_table("statuses", Vec::new());
        let shape = describe(&store, &STATUSES).await.unwrap();
        assert_eq!(shape.source, ColumnSource::Fallback);
        let expected: BTreeSet<String> =
            ["id", "name", "code", "color"].iter().map(|c| c.to_string()).collect();
        assert_eq!(shape.columns, expected);
        assert_eq!(shape.column("name"), Some("name"));
    }

    #[tokio::test]
    async fn test_catalog_preferred_over_sampling() {
        let store = MemoryStore::new().with_table("tags", Vec::new());
        store.set_catalog("tags", ["id", "tag_name"].iter().map(|c| c.to_string()).collect());
        let shape = describe(&store, &TAGS).await.unwrap();
        assert_eq!(shape.source, ColumnSource::Catalog);
        assert_eq!(shape.column("name"), Some("tag_name"));
        assert_eq!(store.selects_on("tags"), 0);
    }

    #[tokio::test]
    async fn test_other_errors_propagate() {
        let store = MemoryStore::new().with_table("status", Vec::new());
        store.fail_table("statuses", StoreError::new("42501", "permission denied for table statuses"));
        let err = describe(&store, &STATUSES).await.unwrap_err();
        match err {
            Error::Store(e) => assert_eq!(e.code.as_deref(), Some("42501")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.selects_on("status"), 0);
    }

    #[tokio::test]
    async fn test_no_candidate_is_not_found() {
        let store = MemoryStore::new();
        let err = describe(&store, &STATUSES).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_discover_columns() {
        let store = MemoryStore::new()
            .with_json_table("shots", json!([{"id": 1, "code": "sh010"}]))
            .with_table("assets", Vec::new());
        let columns = discover_columns(&store, "shots").await.unwrap().unwrap();
        assert!(columns.contains("code"));
        assert!(discover_columns(&store, "assets").await.unwrap().is_none());
        assert!(discover_columns(&store, "versions").await.unwrap().is_none());
    }

    #[test]
    fn test_pick_writable_columns() {
        let columns: BTreeSet<String> =
            ["id", "name", "color", "updated_at"].iter().map(|c| c.to_string()).collect();
        let mut input = Row::new();
        input.insert("id".into(), Value::from(3));
        input.insert("name".into(), Value::text("Active"));
        input.insert("color".into(), Value::text("#fff"));
        input.insert("unknown".into(), Value::text("x"));
        input.insert("updated_at".into(), Value::text("now"));

        let picked = pick_writable_columns(&columns, &input, &["color"]);
        assert_eq!(picked.keys().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn test_map_semantic_input() {
        let columns: BTreeSet<String> =
            ["id", "status_name", "short_code"].iter().map(|c| c.to_string()).collect();
        let shape = TableShape {
            table: "status".into(),
            resolved: STATUSES.columns.resolve(&columns),
            columns,
            source: ColumnSource::Sample,
        };
        let row = map_semantic_input(
            &shape,
            &[("name", Value::text("Review")), ("code", Value::text("rev")), ("color", Value::text("#f00"))],
            &[],
        );
        assert_eq!(row.get("status_name"), Some(&Value::text("Review")));
        assert_eq!(row.get("short_code"), Some(&Value::text("rev")));
        assert_eq!(row.len(), 2);
    }
}
