//! PostgREST adapter.
//!
//! Speaks the REST dialect exposed under `/rest/v1`: filters as query
//! parameters (`col=eq.x`, `col=in.("a","b")`, `col=is.null`), `order`,
//! `limit` and `offset`, writes with `Prefer: return=representation`, and
//! procedures under `/rest/v1/rpc/<name>`.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::debug;

use super::{Filter, Select, Store, StoreResult};
use crate::config::CoreConfig;
use crate::error::{Error, Result, StoreError};
use crate::value::{row_from_json, Row, RowExt, Value};

/// Store backed by a PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct RestStore {
    http: Client,
    base_url: String,
    key: String,
}

impl RestStore {
    /// Create a store for `base_url` authenticated with `key`.
    pub fn new(base_url: impl Into<String>, key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key: key.into(),
        })
    }

    /// Create a store from the core configuration.
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        let url = config
            .rest_url
            .as_deref()
            .ok_or_else(|| Error::Config("REST store URL is not set".into()))?;
        let key = config
            .service_key
            .as_deref()
            .ok_or_else(|| Error::Config("REST store service key is not set".into()))?;
        Self::new(url, key, config.http_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, path))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<serde_json::Value> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::message(format!("store request failed: {e}")))?;
        read_response(response).await
    }

    async fn send_rows(&self, request: RequestBuilder) -> StoreResult<Vec<Row>> {
        match self.send(request).await? {
            serde_json::Value::Array(items) => Ok(items.into_iter().map(row_from_json).collect()),
            serde_json::Value::Null => Ok(Vec::new()),
            other => Ok(vec![row_from_json(other)]),
        }
    }
}

async fn read_response(response: Response) -> StoreResult<serde_json::Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| StoreError::message(format!("failed to read store response: {e}")))?;

    if !status.is_success() {
        return Err(match serde_json::from_str::<StoreError>(&body) {
            Ok(error) if !error.message.is_empty() => error,
            _ => StoreError::new(status.as_u16().to_string(), format!("store returned {status}"))
                .with_details(body),
        });
    }

    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|e| StoreError::message(format!("invalid store response: {e}")))
}

/// Encode one value for a filter operand.
fn encode_operand(value: &Value) -> String {
    value.to_text()
}

/// Quote a value inside an `in.(...)` list.
fn quote_list_item(value: &Value) -> String {
    let text = value.to_text().replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{text}\"")
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| match filter {
            Filter::Eq { column, value } => (column.clone(), format!("eq.{}", encode_operand(value))),
            Filter::In { column, values } => {
                let items: Vec<String> = values.iter().map(quote_list_item).collect();
                (column.clone(), format!("in.({})", items.join(",")))
            }
            Filter::IsNull { column } => (column.clone(), "is.null".to_string()),
        })
        .collect()
}

/// Query parameters for a select.
pub(crate) fn select_params(query: &Select) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let columns = match &query.columns {
        Some(columns) if !columns.is_empty() => columns.join(","),
        _ => "*".to_string(),
    };
    params.push(("select".to_string(), columns));
    params.extend(filter_params(&query.filters));
    if !query.order.is_empty() {
        let order: Vec<String> = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
            .collect();
        params.push(("order".to_string(), order.join(",")));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = query.offset {
        params.push(("offset".to_string(), offset.to_string()));
    }
    params
}

/// Column names for `table` from the OpenAPI description document.
fn columns_from_openapi(document: &serde_json::Value, table: &str) -> Option<BTreeSet<String>> {
    let properties = document
        .get("definitions")?
        .get(table)?
        .get("properties")?
        .as_object()?;
    Some(properties.keys().cloned().collect())
}

#[async_trait]
impl Store for RestStore {
    async fn select(&self, query: Select) -> StoreResult<Vec<Row>> {
        debug!(table = %query.table, filters = query.filters.len(), "store select");
        let request = self.request(Method::GET, &query.table).query(&select_params(&query));
        self.send_rows(request).await
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        let request = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&row.to_json());
        self.send_rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::message(format!("insert into {table} returned no row")))
    }

    async fn update(&self, table: &str, filters: Vec<Filter>, patch: Row) -> StoreResult<Vec<Row>> {
        let request = self
            .request(Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(&filter_params(&filters))
            .json(&patch.to_json());
        self.send_rows(request).await
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> StoreResult<Vec<Row>> {
        let request = self
            .request(Method::DELETE, table)
            .header("Prefer", "return=representation")
            .query(&filter_params(&filters));
        self.send_rows(request).await
    }

    async fn call(&self, procedure: &str, args: serde_json::Value) -> StoreResult<serde_json::Value> {
        debug!(procedure, "store procedure call");
        let request = self
            .request(Method::POST, &format!("rpc/{procedure}"))
            .json(&args);
        self.send(request).await
    }

    async fn describe_table(&self, table: &str) -> StoreResult<Option<BTreeSet<String>>> {
        let request = self
            .request(Method::GET, "")
            .header("Accept", "application/openapi+json");
        let document = self.send(request).await?;
        Ok(columns_from_openapi(&document, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Vec<&'a str> {
        params
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[test]
    fn test_select_params() {
        let query = Select::from("profiles")
            .columns(["id", "display_name"])
            .in_list("id", ["a1", "b\"2"])
            .eq("active", true)
            .order_by("display_name", true)
            .order_by("id", false)
            .limit(5)
            .offset(10);
        let params = select_params(&query);

        assert_eq!(param(&params, "select"), vec!["id,display_name"]);
        assert_eq!(param(&params, "id"), vec!["in.(\"a1\",\"b\\\"2\")"]);
        assert_eq!(param(&params, "active"), vec!["eq.true"]);
        assert_eq!(param(&params, "order"), vec!["display_name.asc,id.desc"]);
        assert_eq!(param(&params, "limit"), vec!["5"]);
        assert_eq!(param(&params, "offset"), vec!["10"]);
    }

    #[test]
    fn test_select_all_and_null_filter() {
        let query = Select::from("tasks").filter(Filter::is_null("step_id")).eq("project_id", 12);
        let params = select_params(&query);
        assert_eq!(param(&params, "select"), vec!["*"]);
        assert_eq!(param(&params, "step_id"), vec!["is.null"]);
        assert_eq!(param(&params, "project_id"), vec!["eq.12"]);
    }

    #[test]
    fn test_columns_from_openapi() {
        let document = json!({
            "definitions": {
                "statuses": {"properties": {"id": {}, "name": {}, "color": {}}}
            }
        });
        let columns = columns_from_openapi(&document, "statuses").unwrap();
        assert!(columns.contains("color"));
        assert_eq!(columns.len(), 3);
        assert!(columns_from_openapi(&document, "status").is_none());
    }

    #[test]
    fn test_from_config_requires_url_and_key() {
        let err = RestStore::from_config(&CoreConfig::new()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let store = RestStore::from_config(
            &CoreConfig::new()
                .with_rest_url("https://abcd.supabase.co/")
                .with_service_key("k"),
        )
        .unwrap();
        assert_eq!(store.base_url(), "https://abcd.supabase.co");
    }
}
