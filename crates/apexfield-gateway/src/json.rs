//! JSON request and response types for the HTTP gateway.

use apexfield_core::{AttachOptions, FieldEdit, Row};
use serde::{Deserialize, Serialize};

/// Generic success response wrapper.
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    /// Success flag.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    /// Create a new success response.
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status.
    pub status: String,
    /// Gateway version.
    pub version: String,
    /// Store backing the gateway (`rest` or `fixture`).
    pub store: String,
}

/// A batch of raw rows.
#[derive(Debug, Deserialize)]
pub struct RowsRequest {
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// Fetch cycle request.
#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    /// View key; a newer fetch for the same key supersedes this one.
    pub view: String,
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// Header fields for one row.
#[derive(Debug, Deserialize)]
pub struct HeaderRequest {
    pub row: Row,
    /// Render long text as textareas.
    #[serde(default)]
    pub info: bool,
}

/// One edit of one row.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    /// Current row, including `id`.
    pub row: Row,
    #[serde(flatten)]
    pub edit: FieldEdit,
}

/// Attach a field to an entity type.
#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    pub entity_type: String,
    #[serde(flatten)]
    pub options: AttachOptions,
}

/// Change a field's data type.
#[derive(Debug, Deserialize)]
pub struct DataTypeRequest {
    pub data_type: String,
}

/// Deactivate a field.
#[derive(Debug, Default, Deserialize)]
pub struct DeactivateRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Bootstrap definitions from physical columns.
#[derive(Debug, Default, Deserialize)]
pub struct BootstrapRequest {
    #[serde(default)]
    pub entity_type: Option<String>,
}

/// Id of a created record.
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}

/// Number of definitions touched by a bootstrap.
#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    pub count: i64,
}
