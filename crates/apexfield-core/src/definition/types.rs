//! Custom field definition types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Data type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum DataType {
    Text,
    TextArea,
    Number,
    Float,
    Checkbox,
    Date,
    DateTime,
    Duration,
    Percent,
    Currency,
    Timecode,
    List,
    StatusList,
    Entity,
    MultiEntity,
    TagList,
    Image,
    Url,
    Color,
    Serializable,
    Calculated,
    Query,
    Summary,
    FileLink,
    Footage,
    Password,
    UrlTemplate,
}

impl DataType {
    pub const ALL: &'static [DataType] = &[
        DataType::Text,
        DataType::TextArea,
        DataType::Number,
        DataType::Float,
        DataType::Checkbox,
        DataType::Date,
        DataType::DateTime,
        DataType::Duration,
        DataType::Percent,
        DataType::Currency,
        DataType::Timecode,
        DataType::List,
        DataType::StatusList,
        DataType::Entity,
        DataType::MultiEntity,
        DataType::TagList,
        DataType::Image,
        DataType::Url,
        DataType::Color,
        DataType::Serializable,
        DataType::Calculated,
        DataType::Query,
        DataType::Summary,
        DataType::FileLink,
        DataType::Footage,
        DataType::Password,
        DataType::UrlTemplate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::TextArea => "text_area",
            DataType::Number => "number",
            DataType::Float => "float",
            DataType::Checkbox => "checkbox",
            DataType::Date => "date",
            DataType::DateTime => "date_time",
            DataType::Duration => "duration",
            DataType::Percent => "percent",
            DataType::Currency => "currency",
            DataType::Timecode => "timecode",
            DataType::List => "list",
            DataType::StatusList => "status_list",
            DataType::Entity => "entity",
            DataType::MultiEntity => "multi_entity",
            DataType::TagList => "tag_list",
            DataType::Image => "image",
            DataType::Url => "url",
            DataType::Color => "color",
            DataType::Serializable => "serializable",
            DataType::Calculated => "calculated",
            DataType::Query => "query",
            DataType::Summary => "summary",
            DataType::FileLink => "file_link",
            DataType::Footage => "footage",
            DataType::Password => "password",
            DataType::UrlTemplate => "url_template",
        }
    }

    /// Map a stored or physical type name onto a data type.
    ///
    /// Known data type names map to themselves; common physical type names
    /// (`integer`, `jsonb`, `text[]`, ...) map to their closest data type;
    /// anything else is text.
    pub fn from_lenient(raw: &str) -> Self {
        let raw = raw.trim().to_lowercase();
        if let Ok(data_type) = raw.parse() {
            return data_type;
        }
        match raw.as_str() {
            "status" => DataType::StatusList,
            "tag" => DataType::TagList,
            "integer" | "int" | "int4" | "int8" | "bigint" | "smallint" => DataType::Number,
            "double precision" | "real" | "numeric" | "decimal" => DataType::Float,
            "boolean" | "bool" => DataType::Checkbox,
            "timestamptz" | "timestamp" | "timestamp with time zone" => DataType::DateTime,
            "jsonb" | "json" => DataType::Serializable,
            "text[]" | "varchar[]" => DataType::TagList,
            _ => DataType::Text,
        }
    }

    /// Types whose values can never be edited in place.
    pub fn is_non_editable(&self) -> bool {
        matches!(
            self,
            DataType::Serializable
                | DataType::Query
                | DataType::Summary
                | DataType::Image
                | DataType::Calculated
                | DataType::Entity
                | DataType::MultiEntity
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Number | DataType::Float | DataType::Duration | DataType::Percent | DataType::Currency
        )
    }

    /// Types holding several values per cell.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, DataType::TagList | DataType::MultiEntity)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        DataType::ALL
            .iter()
            .copied()
            .find(|dt| dt.as_str() == s)
            .ok_or_else(|| format!("unknown data type: {s}"))
    }
}

impl From<String> for DataType {
    fn from(raw: String) -> Self {
        DataType::from_lenient(&raw)
    }
}

impl From<DataType> for &'static str {
    fn from(data_type: DataType) -> Self {
        data_type.as_str()
    }
}

/// Ownership class of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Dynamic,
    Permanent,
    SystemOwned,
    Custom,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Dynamic => "dynamic",
            FieldType::Permanent => "permanent",
            FieldType::SystemOwned => "system_owned",
            FieldType::Custom => "custom",
        }
    }

    /// Unknown names fall back to `dynamic`.
    pub fn from_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "permanent" => FieldType::Permanent,
            "system_owned" => FieldType::SystemOwned,
            "custom" => FieldType::Custom,
            _ => FieldType::Dynamic,
        }
    }
}

fn lenient_field_type<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FieldType, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|r| FieldType::from_lenient(&r)).unwrap_or_default())
}

fn lenient_data_type<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DataType, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|r| DataType::from_lenient(&r)).unwrap_or(DataType::Text))
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.map(|v| crate::value::Value::from(v).to_items()).unwrap_or_default())
}

fn default_true() -> bool {
    true
}

fn lenient_true<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

fn lenient_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn default_display_order() -> i64 {
    DEFAULT_DISPLAY_ORDER
}

/// Display order given to new attachments when none is supplied.
pub const DEFAULT_DISPLAY_ORDER: i64 = 1000;

/// A persisted field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    pub name: String,
    pub code: String,
    #[serde(default = "default_text", deserialize_with = "lenient_data_type")]
    pub data_type: DataType,
    #[serde(default, deserialize_with = "lenient_field_type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub choice_set_id: Option<i64>,
    /// Attached entity types.
    #[serde(default, deserialize_with = "lenient_list")]
    pub entities: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub link_target_entities: Vec<String>,
    #[serde(default, deserialize_with = "lenient_false")]
    pub required: bool,
    #[serde(default = "default_true", deserialize_with = "lenient_true")]
    pub visible_by_default: bool,
    #[serde(default = "default_display_order")]
    pub display_order: i64,
    #[serde(default = "default_true", alias = "is_active", deserialize_with = "lenient_true")]
    pub active: bool,
}

fn default_text() -> DataType {
    DataType::Text
}

/// One row of the field runtime view: a definition joined with one attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeField {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub field_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub column_name: Option<String>,
    #[serde(default = "default_text", deserialize_with = "lenient_data_type")]
    pub data_type: DataType,
    #[serde(default, deserialize_with = "lenient_field_type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub choice_set_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub link_target_entities: Vec<String>,
    #[serde(default, deserialize_with = "lenient_false")]
    pub required: bool,
    #[serde(default = "default_true", deserialize_with = "lenient_true")]
    pub visible_by_default: bool,
    #[serde(default = "default_display_order", deserialize_with = "lenient_order")]
    pub display_order: i64,
    #[serde(default = "default_true", deserialize_with = "lenient_true")]
    pub field_active: bool,
    #[serde(default = "default_true", deserialize_with = "lenient_true")]
    pub entity_active: bool,
}

fn lenient_order<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(lenient_i64(deserializer)?.unwrap_or(DEFAULT_DISPLAY_ORDER))
}

impl RuntimeField {
    /// Physical column backing this field, trimmed; `None` when blank.
    pub fn column(&self) -> Option<&str> {
        self.column_name.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    /// Normalized code, falling back to the column name.
    pub fn code(&self) -> Option<String> {
        self.code
            .as_deref()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .or_else(|| self.column().map(str::to_string))
    }

    /// Display label, falling back to the column name.
    pub fn label(&self) -> Option<String> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| self.column().map(str::to_string))
    }
}

/// A permitted value of a choice set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceSetItem {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub choice_set_id: Option<i64>,
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub sort_order: Option<i64>,
    #[serde(default = "default_true", alias = "is_active", deserialize_with = "lenient_true")]
    pub active: bool,
}

impl ChoiceSetItem {
    pub fn display_label(&self) -> &str {
        self.label
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&self.value)
    }
}

/// A named, ordered list of permitted values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceSet {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true", alias = "is_active", deserialize_with = "lenient_true")]
    pub active: bool,
    #[serde(default)]
    pub items: Vec<ChoiceSetItem>,
}

/// Input for creating a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewField {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub field_type: Option<FieldType>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
    #[serde(default)]
    pub choice_set_id: Option<i64>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default, deserialize_with = "lenient_false")]
    pub required: bool,
    #[serde(default)]
    pub visible_by_default: Option<bool>,
    #[serde(default)]
    pub display_order: Option<i64>,
    #[serde(default)]
    pub link_target_entities: Vec<String>,
}

impl NewField {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_choice_set(mut self, choice_set_id: i64) -> Self {
        self.choice_set_id = Some(choice_set_id);
        self
    }

    pub fn with_link_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.link_target_entities = targets.into_iter().map(Into::into).collect();
        self
    }
}

/// Per-entity attachment overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachOptions {
    #[serde(default, deserialize_with = "lenient_false")]
    pub required: bool,
    #[serde(default)]
    pub visible_by_default: Option<bool>,
    #[serde(default)]
    pub display_order: Option<i64>,
}

/// Input item for a new choice set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewChoiceItem {
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
}

/// Input for creating a choice set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewChoiceSet {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<NewChoiceItem>,
}

/// One key of a metadata patch.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Leave the stored value untouched. Never forwarded.
    Keep,
    /// Set the stored value to null.
    Clear,
    Set(serde_json::Value),
}

/// A metadata patch: keys are definition columns.
///
/// Deserialized from a JSON object, `null` becomes [`Patch::Clear`] and any
/// other value [`Patch::Set`]. [`Patch::Keep`] exists for callers building a
/// patch from optional inputs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "serde_json::Map<String, serde_json::Value>")]
pub struct FieldPatch {
    entries: BTreeMap<String, Patch>,
}

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.entries.insert(key.into(), Patch::Set(value.into()));
        self
    }

    pub fn clear(mut self, key: impl Into<String>) -> Self {
        self.entries.insert(key.into(), Patch::Clear);
        self
    }

    pub fn keep(mut self, key: impl Into<String>) -> Self {
        self.entries.insert(key.into(), Patch::Keep);
        self
    }

    /// Set `key` when `value` is `Some`, keep otherwise.
    pub fn maybe<V: Into<serde_json::Value>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self.keep(key),
        }
    }

    /// Remove and return the entry for `key`.
    pub fn take(&mut self, key: &str) -> Option<Patch> {
        self.entries.remove(key)
    }

    /// Forwardable entries: `Keep` dropped, `Clear` as explicit null.
    pub fn sanitized(&self) -> serde_json::Map<String, serde_json::Value> {
        self.entries
            .iter()
            .filter_map(|(key, patch)| match patch {
                Patch::Keep => None,
                Patch::Clear => Some((key.clone(), serde_json::Value::Null)),
                Patch::Set(value) => Some((key.clone(), value.clone())),
            })
            .collect()
    }

    /// True when nothing would be forwarded.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|p| matches!(p, Patch::Keep))
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for FieldPatch {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        let entries = map
            .into_iter()
            .map(|(key, value)| {
                let patch = if value.is_null() { Patch::Clear } else { Patch::Set(value) };
                (key, patch)
            })
            .collect();
        Self { entries }
    }
}
