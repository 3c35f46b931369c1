//! Row values.
//!
//! Rows coming out of the store are arbitrary key/value maps. Every value is
//! folded into a small closed set of variants so the rest of the core never
//! has to reason about nested JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

/// A row keyed by physical column name.
pub type Row = BTreeMap<String, Value>;

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, or text that is empty after trimming, or an empty list.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Numeric view: numbers as-is, numeric text parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Display text. Lists are joined with `", "`, null is empty.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::List(items) => format_text_list(items),
        }
    }

    /// Trimmed display text, `None` when blank.
    pub fn non_empty_text(&self) -> Option<String> {
        let text = self.to_text();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Items of a multi-valued cell: lists as-is, text parsed as JSON array or CSV.
    pub fn to_items(&self) -> Vec<String> {
        match self {
            Value::Null => Vec::new(),
            Value::List(items) => normalize_items(items.iter().map(String::as_str)),
            Value::Text(s) => parse_text_list(s),
            other => normalize_items([other.to_text().as_str()]),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => Value::List(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        serde_json::Value::Null => None,
                        serde_json::Value::String(s) => Some(s),
                        other => Some(Value::from(other).to_text()),
                    })
                    .collect(),
            ),
            object @ serde_json::Value::Object(_) => Value::Text(object.to_string()),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => number_to_json(n),
            Value::Text(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::String).collect())
            }
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

fn normalize_items<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() || out.iter().any(|seen| seen == item) {
            continue;
        }
        out.push(item.to_string());
    }
    out
}

/// Parse the textual form of a multi-valued cell.
///
/// Accepts a JSON array (`["a","b"]`) or comma separated text. Items are
/// trimmed, empties dropped, duplicates removed keeping first occurrence.
/// JSON items holding a comma are split like comma separated text.
pub fn parse_text_list(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.starts_with('[') {
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
            let items: Vec<String> = items
                .into_iter()
                .filter(|item| !item.is_null())
                .map(|item| Value::from(item).to_text())
                .collect();
            return normalize_items(items.iter().flat_map(|item| item.split(',')));
        }
    }
    normalize_items(trimmed.split(','))
}

/// Join items into the textual form read back by [`parse_text_list`].
pub fn format_text_list(items: &[String]) -> String {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience accessors on rows.
pub trait RowExt {
    /// Value under `key`, `Null` when absent.
    fn value(&self, key: &str) -> &Value;

    /// Trimmed non-empty text under `key`.
    fn text(&self, key: &str) -> Option<String>;

    /// First non-empty text among `keys`.
    fn first_text(&self, keys: &[&str]) -> Option<String>;

    /// The row's `id` as an id key.
    fn id_key(&self) -> Option<String> {
        self.text("id")
    }

    /// Convert to a JSON object.
    fn to_json(&self) -> serde_json::Value;
}

static NULL: Value = Value::Null;

impl RowExt for Row {
    fn value(&self, key: &str) -> &Value {
        self.get(key).unwrap_or(&NULL)
    }

    fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(Value::non_empty_text)
    }

    fn first_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.text(key))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::from(v.clone())))
                .collect(),
        )
    }
}

/// Build a row from a JSON object. Non-objects yield an empty row.
pub fn row_from_json(json: serde_json::Value) -> Row {
    match json {
        serde_json::Value::Object(map) => map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
        _ => Row::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion() {
        assert_eq!(Value::from(json!(null)), Value::Null);
        assert_eq!(Value::from(json!(3)), Value::Number(3.0));
        assert_eq!(Value::from(json!("x")), Value::text("x"));
        assert_eq!(Value::from(json!(["a", 2, null])), Value::list(["a", "2"]));
        assert_eq!(Value::from(json!({"a": 1})), Value::text("{\"a\":1}"));

        assert_eq!(serde_json::Value::from(Value::Number(12.0)), json!(12));
        assert_eq!(serde_json::Value::from(Value::Number(1.5)), json!(1.5));
    }

    #[test]
    fn test_serde_is_plain_json() {
        let mut row = Row::new();
        row.insert("id".into(), Value::Number(7.0));
        row.insert("tags".into(), Value::list(["hero", "fx"]));
        let encoded = serde_json::to_value(&row).unwrap();
        assert_eq!(encoded, json!({"id": 7, "tags": ["hero", "fx"]}));

        let decoded: Row = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::Number(42.0).to_text(), "42");
        assert_eq!(Value::Number(2.5).to_text(), "2.5");
        assert_eq!(Value::list(["a", "b"]).to_text(), "a, b");
        assert_eq!(Value::Null.to_text(), "");
    }

    #[test]
    fn test_parse_text_list() {
        assert_eq!(parse_text_list(" a, b ,,a "), vec!["a", "b"]);
        assert_eq!(parse_text_list("[\"x\", \" y\", 3]"), vec!["x", "y", "3"]);
        assert_eq!(parse_text_list("[not json"), vec!["[not json"]);
        assert!(parse_text_list("   ").is_empty());
    }

    #[test]
    fn test_format_parse_is_idempotent() {
        let inputs = [
            " hero , fx,hero,, env ",
            "[\"b\",\"a\",\"b\"]",
            "[\"a\", \"b,c\", \" c \"]",
            "single",
            "",
        ];
        for input in inputs {
            let first = parse_text_list(input);
            let mut current = first.clone();
            for _ in 0..3 {
                current = parse_text_list(&format_text_list(&current));
                assert_eq!(current, first, "input {input:?}");
            }
        }
        assert_eq!(parse_text_list("[\"a\", \"b,c\"]"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_row_ext() {
        let row = row_from_json(json!({"name": "  ", "status_name": "Active", "id": 5}));
        assert_eq!(row.text("name"), None);
        assert_eq!(row.first_text(&["name", "status_name"]), Some("Active".into()));
        assert_eq!(row.id_key(), Some("5".into()));
        assert!(row.value("missing").is_null());
    }
}
