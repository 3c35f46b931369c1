//! Core error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::definition::MigrationError;

/// Error codes the backing store uses for a table it cannot see.
const MISSING_TABLE_CODES: &[&str] = &["PGRST205", "42P01"];

/// Error codes the backing store uses for an unknown procedure.
const MISSING_PROCEDURE_CODES: &[&str] = &["42883", "PGRST202"];

/// Structured error reported by a backing store.
///
/// Mirrors the `{code, message, details, hint}` shape relational stores put
/// on the wire, so recognition predicates work the same for every adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct StoreError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl StoreError {
    /// Create an error with a store-specific code.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    /// Create an error without a code (transport failures, decoding).
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// The error a store reports for a table that is not in its schema cache.
    pub fn missing_table(table: &str) -> Self {
        Self::new(
            "PGRST205",
            format!("Could not find the table 'public.{table}' in the schema cache"),
        )
    }

    /// The error a store reports for a procedure it does not know.
    pub fn missing_procedure(procedure: &str) -> Self {
        Self::new(
            "PGRST202",
            format!("Could not find the function public.{procedure} in the schema cache"),
        )
        .with_hint("Perhaps you meant to call a different function")
    }

    /// Whether this error means the queried table does not exist.
    pub fn is_missing_table(&self) -> bool {
        if let Some(code) = self.code.as_deref() {
            if MISSING_TABLE_CODES.contains(&code) {
                return true;
            }
        }
        let message = self.message.to_lowercase();
        if message.contains("could not find the table") {
            return true;
        }
        if message.contains("relation") && message.contains("does not exist") {
            return true;
        }
        self.details
            .as_deref()
            .map(|d| d.to_lowercase().contains("does not exist"))
            .unwrap_or(false)
    }

    /// Whether this error means `procedure` is not installed.
    pub fn is_missing_procedure(&self, procedure: &str) -> bool {
        if let Some(code) = self.code.as_deref() {
            if MISSING_PROCEDURE_CODES.contains(&code) {
                return true;
            }
        }
        !procedure.is_empty() && self.message.contains(procedure)
    }
}

/// Errors surfaced by the field core.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller input rejected before touching the store.
    #[error("validation error: {0}")]
    Validation(String),

    /// No candidate resolved (table, handler, record).
    #[error("not found: {0}")]
    NotFound(String),

    /// A named procedure is not installed in the store.
    #[error("procedure {procedure} is not available: {message}")]
    ProcedureMissing { procedure: String, message: String },

    /// Every remediation attempt for a missing procedure failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// A mutation handler rejected the payload. Carried verbatim.
    #[error("{0}")]
    Upstream(String),

    /// Backing store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
