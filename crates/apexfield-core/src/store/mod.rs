//! Backing store port.
//!
//! The core only ever talks to a relational store through [`Store`]: row
//! selects with filters and ranges, writes that return the affected rows, and
//! named procedure calls. Errors are structured [`StoreError`]s so callers can
//! recognize specific failure signatures.

pub mod fixture;
pub mod memory;
pub mod rest;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::value::{Row, Value};

pub use memory::{MemoryStore, StoreCall};
pub use rest::RestStore;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Shared handle to a store.
pub type SharedStore = Arc<dyn Store>;

/// A row filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { column: String, value: Value },
    In { column: String, values: Vec<Value> },
    IsNull { column: String },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn in_list<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::IsNull {
            column: column.into(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. } | Filter::In { column, .. } | Filter::IsNull { column } => {
                column
            }
        }
    }
}

/// Sort key for a select.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A row select.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Select {
    pub table: String,
    /// Projected columns, `None` for all.
    pub columns: Option<Vec<String>>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn in_list<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(Filter::in_list(column, values))
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Capability surface of the backing relational store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Select rows.
    async fn select(&self, query: Select) -> StoreResult<Vec<Row>>;

    /// Insert one row and return it as stored.
    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row>;

    /// Update matching rows and return them.
    async fn update(&self, table: &str, filters: Vec<Filter>, patch: Row) -> StoreResult<Vec<Row>>;

    /// Delete matching rows and return them.
    async fn delete(&self, table: &str, filters: Vec<Filter>) -> StoreResult<Vec<Row>>;

    /// Call a named procedure with JSON arguments.
    async fn call(&self, procedure: &str, args: serde_json::Value) -> StoreResult<serde_json::Value>;

    /// Column names from the store's catalog, when it exposes one.
    ///
    /// `Ok(None)` means no catalog information for `table`; callers then
    /// fall back to sampling rows.
    async fn describe_table(&self, _table: &str) -> StoreResult<Option<BTreeSet<String>>> {
        Ok(None)
    }
}
