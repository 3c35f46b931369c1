//! In-process store.
//!
//! Holds tables as vectors of rows behind `parking_lot` locks, emulates the
//! store's error signatures for missing tables and procedures, and records
//! every call so tests can assert round-trip counts.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::{Filter, Select, Store, StoreResult};
use crate::error::StoreError;
use crate::value::{row_from_json, Row, RowExt, Value};

/// A procedure body. Receives the store so it can read and write tables.
pub type Procedure =
    Arc<dyn Fn(&MemoryStore, serde_json::Value) -> StoreResult<serde_json::Value> + Send + Sync>;

/// One recorded store operation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Select(Select),
    Insert { table: String },
    Update { table: String },
    Delete { table: String },
    Call { procedure: String, args: serde_json::Value },
    Describe { table: String },
}

/// In-memory implementation of [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<String, Vec<Row>>>,
    procedures: RwLock<HashMap<String, Procedure>>,
    catalog: RwLock<HashMap<String, BTreeSet<String>>>,
    failures: RwLock<HashMap<String, StoreError>>,
    log: Mutex<Vec<StoreCall>>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("tables", &self.tables.read().keys().collect::<Vec<_>>())
            .field("procedures", &self.procedures.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a fixture document.
    ///
    /// ```json
    /// { "tables": { "statuses": [ {"id": 1, "name": "Active"} ] },
    ///   "catalog": { "statuses": ["id", "name", "code"] } }
    /// ```
    pub fn from_fixture(fixture: serde_json::Value) -> StoreResult<Self> {
        let store = Self::new();
        let tables = fixture
            .get("tables")
            .and_then(|t| t.as_object())
            .ok_or_else(|| StoreError::message("fixture must contain a \"tables\" object"))?;
        for (name, rows) in tables {
            let rows = rows
                .as_array()
                .ok_or_else(|| StoreError::message(format!("fixture table {name} must be an array")))?;
            store.seed(name, rows.iter().cloned().map(row_from_json).collect());
        }
        if let Some(catalog) = fixture.get("catalog").and_then(|c| c.as_object()) {
            for (name, columns) in catalog {
                let columns = columns
                    .as_array()
                    .map(|cols| cols.iter().filter_map(|c| c.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                store.set_catalog(name, columns);
            }
        }
        Ok(store)
    }

    /// Add a table with rows (builder form).
    pub fn with_table(self, name: &str, rows: Vec<Row>) -> Self {
        self.seed(name, rows);
        self
    }

    /// Add a table from a JSON array of objects (builder form).
    pub fn with_json_table(self, name: &str, rows: serde_json::Value) -> Self {
        let rows = match rows {
            serde_json::Value::Array(items) => items.into_iter().map(row_from_json).collect(),
            _ => Vec::new(),
        };
        self.with_table(name, rows)
    }

    /// Create an empty table if it does not exist.
    pub fn create_table(&self, name: &str) {
        self.tables.write().entry(name.to_string()).or_default();
    }

    /// Append rows, creating the table when needed.
    pub fn seed(&self, name: &str, rows: Vec<Row>) {
        self.tables.write().entry(name.to_string()).or_default().extend(rows);
    }

    pub fn drop_table(&self, name: &str) {
        self.tables.write().remove(name);
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Snapshot of a table's rows.
    pub fn rows(&self, name: &str) -> Option<Vec<Row>> {
        self.tables.read().get(name).cloned()
    }

    /// Replace a table's contents.
    pub fn replace_rows(&self, name: &str, rows: Vec<Row>) {
        self.tables.write().insert(name.to_string(), rows);
    }

    /// Register catalog columns for a table.
    pub fn set_catalog(&self, table: &str, columns: BTreeSet<String>) {
        self.catalog.write().insert(table.to_string(), columns);
    }

    /// Make every operation on `table` fail with `error`.
    pub fn fail_table(&self, table: &str, error: StoreError) {
        self.failures.write().insert(table.to_string(), error);
    }

    /// Register a procedure.
    pub fn register_procedure<F>(&self, name: &str, body: F)
    where
        F: Fn(&MemoryStore, serde_json::Value) -> StoreResult<serde_json::Value> + Send + Sync + 'static,
    {
        self.procedures.write().insert(name.to_string(), Arc::new(body));
    }

    pub fn remove_procedure(&self, name: &str) {
        self.procedures.write().remove(name);
    }

    pub fn has_procedure(&self, name: &str) -> bool {
        self.procedures.read().contains_key(name)
    }

    /// Every call recorded so far.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.log.lock().clone()
    }

    /// Number of selects issued against `table`.
    pub fn selects_on(&self, table: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|call| matches!(call, StoreCall::Select(q) if q.table == table))
            .count()
    }

    /// Number of calls made to `procedure`.
    pub fn calls_to(&self, procedure: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|call| matches!(call, StoreCall::Call { procedure: p, .. } if p == procedure))
            .count()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    fn record(&self, call: StoreCall) {
        self.log.lock().push(call);
    }

    fn check_failure(&self, table: &str) -> StoreResult<()> {
        match self.failures.read().get(table) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Run a select without recording it.
    pub fn select_rows(&self, query: &Select) -> StoreResult<Vec<Row>> {
        self.check_failure(&query.table)?;
        let tables = self.tables.read();
        let rows = tables
            .get(&query.table)
            .ok_or_else(|| StoreError::missing_table(&query.table))?;

        let mut matched: Vec<Row> = rows
            .iter()
            .filter(|row| query.filters.iter().all(|f| matches_filter(row, f)))
            .cloned()
            .collect();
        drop(tables);

        if !query.order.is_empty() {
            matched.sort_by(|a, b| {
                for order in &query.order {
                    let ordering = compare_values(a.value(&order.column), b.value(&order.column));
                    let ordering = if order.ascending { ordering } else { ordering.reverse() };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        let projected = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| project(row, query.columns.as_deref()))
            .collect();
        Ok(projected)
    }

    /// Insert a row without recording it. Assigns a numeric `id` when absent.
    pub fn insert_row(&self, table: &str, mut row: Row) -> StoreResult<Row> {
        self.check_failure(table)?;
        let mut tables = self.tables.write();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::missing_table(table))?;
        if row.value("id").is_null() {
            let next = rows
                .iter()
                .filter_map(|r| r.value("id").as_f64())
                .fold(0.0_f64, f64::max)
                + 1.0;
            row.insert("id".to_string(), Value::Number(next));
        }
        rows.push(row.clone());
        Ok(row)
    }

    /// Update matching rows without recording it.
    pub fn update_rows(&self, table: &str, filters: &[Filter], patch: &Row) -> StoreResult<Vec<Row>> {
        self.check_failure(table)?;
        let mut tables = self.tables.write();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::missing_table(table))?;
        let mut updated = Vec::new();
        for row in rows.iter_mut() {
            if filters.iter().all(|f| matches_filter(row, f)) {
                for (key, value) in patch {
                    row.insert(key.clone(), value.clone());
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    /// Delete matching rows without recording it.
    pub fn delete_rows(&self, table: &str, filters: &[Filter]) -> StoreResult<Vec<Row>> {
        self.check_failure(table)?;
        let mut tables = self.tables.write();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::missing_table(table))?;
        let (removed, kept): (Vec<Row>, Vec<Row>) = rows
            .drain(..)
            .partition(|row| filters.iter().all(|f| matches_filter(row, f)));
        *rows = kept;
        Ok(removed)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn select(&self, query: Select) -> StoreResult<Vec<Row>> {
        self.record(StoreCall::Select(query.clone()));
        self.select_rows(&query)
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        self.record(StoreCall::Insert {
            table: table.to_string(),
        });
        self.insert_row(table, row)
    }

    async fn update(&self, table: &str, filters: Vec<Filter>, patch: Row) -> StoreResult<Vec<Row>> {
        self.record(StoreCall::Update {
            table: table.to_string(),
        });
        self.update_rows(table, &filters, &patch)
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> StoreResult<Vec<Row>> {
        self.record(StoreCall::Delete {
            table: table.to_string(),
        });
        self.delete_rows(table, &filters)
    }

    async fn call(&self, procedure: &str, args: serde_json::Value) -> StoreResult<serde_json::Value> {
        self.record(StoreCall::Call {
            procedure: procedure.to_string(),
            args: args.clone(),
        });
        let body = self.procedures.read().get(procedure).cloned();
        match body {
            Some(body) => body(self, args),
            None => Err(StoreError::missing_procedure(procedure)),
        }
    }

    async fn describe_table(&self, table: &str) -> StoreResult<Option<BTreeSet<String>>> {
        self.record(StoreCall::Describe {
            table: table.to_string(),
        });
        Ok(self.catalog.read().get(table).cloned())
    }
}

fn same_value(cell: &Value, expected: &Value) -> bool {
    if cell.is_null() || expected.is_null() {
        return false;
    }
    match (cell.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => cell.to_text().trim() == expected.to_text().trim(),
    }
}

fn matches_filter(row: &Row, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { column, value } => same_value(row.value(column), value),
        Filter::In { column, values } => {
            let cell = row.value(column);
            values.iter().any(|v| same_value(cell, v))
        }
        Filter::IsNull { column } => row.value(column).is_null(),
    }
}

/// Ascending order with nulls last. Numbers compare numerically.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.to_text().to_lowercase().cmp(&b.to_text().to_lowercase()),
    }
}

fn project(row: Row, columns: Option<&[String]>) -> Row {
    match columns {
        None => row,
        Some(columns) if columns.iter().any(|c| c.trim() == "*") => row,
        Some(columns) => row
            .into_iter()
            .filter(|(key, _)| columns.iter().any(|c| c.trim() == key))
            .collect(),
    }
}
