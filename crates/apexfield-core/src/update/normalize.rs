//! Value normalization for edits.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Utc};

use crate::catalog::FieldBehavior;
use crate::definition::DataType;
use crate::error::{Error, Result};
use crate::value::Value;

const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Normalize an incoming edit value against the field's data type.
///
/// `utc_offset_minutes` is the editor's offset, applied to date-times that
/// carry no offset of their own.
pub fn normalize_value(behavior: &FieldBehavior, value: Value, utc_offset_minutes: i32) -> Result<Value> {
    if value.is_blank() {
        return Ok(if behavior.data_type.is_multi_valued() {
            Value::List(Vec::new())
        } else {
            Value::Null
        });
    }

    match behavior.data_type {
        DataType::TagList | DataType::MultiEntity => Ok(Value::List(value.to_items())),
        dt if dt.is_numeric() => value
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| invalid(behavior, &value, "a number")),
        DataType::Checkbox => parse_bool(&value).map(Value::Bool).ok_or_else(|| invalid(behavior, &value, "a boolean")),
        DataType::Date => {
            let text = value.to_text();
            let text = text.trim();
            Ok(Value::text(text.get(..10).unwrap_or(text)))
        }
        DataType::DateTime => to_utc(&value.to_text(), utc_offset_minutes)
            .map(Value::Text)
            .ok_or_else(|| invalid(behavior, &value, "a date-time")),
        _ if behavior.is_link() => Ok(link_id(&value)),
        _ => match value {
            Value::Text(text) => Ok(Value::Text(text)),
            Value::List(_) => Err(invalid(behavior, &value, "a single value")),
            other => Ok(other),
        },
    }
}

fn invalid(behavior: &FieldBehavior, value: &Value, expected: &str) -> Error {
    Error::Validation(format!("{} expects {expected}, got {:?}", behavior.code, value.to_text()))
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) if *n == 1.0 => Some(true),
        Value::Number(n) if *n == 0.0 => Some(false),
        Value::Text(text) => match text.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Numeric ids become numbers, anything else stays text.
fn link_id(value: &Value) -> Value {
    match value {
        Value::Number(_) => value.clone(),
        other => {
            let text = other.to_text().trim().to_string();
            match text.parse::<i64>() {
                Ok(id) => Value::from(id),
                Err(_) => Value::Text(text),
            }
        }
    }
}

/// RFC 3339 in UTC. Values without an offset are read at `offset_minutes`.
pub fn to_utc(raw: &str, offset_minutes: i32) -> Option<String> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(format_utc(instant.with_timezone(&Utc)));
    }
    let local = LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())?;
    let offset = FixedOffset::east_opt(offset_minutes.checked_mul(60)?)?;
    let instant = local.and_local_timezone(offset).single()?;
    Some(format_utc(instant.with_timezone(&Utc)))
}

fn format_utc(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}
