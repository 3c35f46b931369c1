//! View descriptors built from behaviors and options.

use serde::Serialize;

use crate::catalog::FieldBehavior;
use crate::definition::DataType;
use crate::enrich::label_key;
use crate::options::{option_label, FieldOption, OptionMap};
use crate::value::{Row, RowExt, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableColumnType {
    Text,
    Number,
    Boolean,
    Date,
    Datetime,
    Select,
    Status,
    Links,
    Thumbnail,
    Url,
    Color,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorType {
    Text,
    Textarea,
    Number,
    Checkbox,
    Date,
    Datetime,
    Select,
    Multiselect,
    Url,
    Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderFieldType {
    Text,
    Textarea,
    Number,
    Boolean,
    Date,
    Datetime,
    Select,
    Multiselect,
    Readonly,
}

pub fn table_type(data_type: DataType) -> TableColumnType {
    match data_type {
        DataType::Number | DataType::Float | DataType::Duration | DataType::Percent | DataType::Currency => {
            TableColumnType::Number
        }
        DataType::Checkbox => TableColumnType::Boolean,
        DataType::Date => TableColumnType::Date,
        DataType::DateTime => TableColumnType::Datetime,
        DataType::List | DataType::Entity => TableColumnType::Select,
        DataType::StatusList => TableColumnType::Status,
        DataType::MultiEntity | DataType::TagList => TableColumnType::Links,
        DataType::Image => TableColumnType::Thumbnail,
        DataType::Url => TableColumnType::Url,
        DataType::Color => TableColumnType::Color,
        DataType::Serializable => TableColumnType::Json,
        _ => TableColumnType::Text,
    }
}

pub fn editor_type(data_type: DataType) -> Option<EditorType> {
    Some(match data_type {
        DataType::Text => EditorType::Text,
        DataType::TextArea => EditorType::Textarea,
        DataType::Number | DataType::Float | DataType::Duration | DataType::Percent | DataType::Currency => {
            EditorType::Number
        }
        DataType::Checkbox => EditorType::Checkbox,
        DataType::Date => EditorType::Date,
        DataType::DateTime => EditorType::Datetime,
        DataType::List | DataType::StatusList | DataType::Entity => EditorType::Select,
        DataType::MultiEntity | DataType::TagList => EditorType::Multiselect,
        DataType::Url => EditorType::Url,
        DataType::Color => EditorType::Color,
        _ => return None,
    })
}

pub fn header_type(data_type: DataType) -> HeaderFieldType {
    match data_type {
        DataType::TextArea => HeaderFieldType::Textarea,
        DataType::Number | DataType::Float | DataType::Duration | DataType::Percent | DataType::Currency => {
            HeaderFieldType::Number
        }
        DataType::Checkbox => HeaderFieldType::Boolean,
        DataType::Date => HeaderFieldType::Date,
        DataType::DateTime => HeaderFieldType::Datetime,
        DataType::List | DataType::StatusList | DataType::Entity => HeaderFieldType::Select,
        DataType::MultiEntity | DataType::TagList => HeaderFieldType::Multiselect,
        DataType::Image
        | DataType::Serializable
        | DataType::Calculated
        | DataType::Query
        | DataType::Summary => HeaderFieldType::Readonly,
        _ => HeaderFieldType::Text,
    }
}

/// Field whose cell links to the row's own detail page.
pub fn primary_name_field(entity_type: &str) -> Option<&'static str> {
    match entity_type {
        "task" | "shot" | "asset" | "sequence" => Some("name"),
        "version" | "published_file" => Some("code"),
        "note" => Some("subject"),
        _ => None,
    }
}

const LONG_TEXT: &[&str] = &["description", "notes", "summary", "comment", "body", "bio", "details"];

/// A column of an entity table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableColumnDescriptor {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub column_type: TableColumnType,
    pub width: u32,
    pub editable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editor: Option<EditorType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    pub visible: bool,
    /// Cell links to the row's detail page.
    pub primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
}

/// A field of a detail header or info panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderFieldDescriptor {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: HeaderFieldType,
    pub value: Value,
    /// Text to show for `value`: resolved link label, option label, or the value itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub editable: bool,
    pub column: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
}

pub fn table_column(behavior: &FieldBehavior, options: &[FieldOption], entity_type: &str) -> TableColumnDescriptor {
    let editable = behavior.editable && !behavior.readonly;
    TableColumnDescriptor {
        id: behavior.code.clone(),
        label: behavior.label.clone(),
        column_type: table_type(behavior.data_type),
        width: behavior.width,
        editable,
        editor: if editable { editor_type(behavior.data_type) } else { None },
        options: options.to_vec(),
        visible: behavior.visible_by_default,
        primary: primary_name_field(entity_type) == Some(behavior.code.as_str()),
        link_target: behavior.link_target.clone(),
    }
}

pub fn table_columns(behaviors: &[FieldBehavior], options: &OptionMap, entity_type: &str) -> Vec<TableColumnDescriptor> {
    behaviors
        .iter()
        .map(|b| table_column(b, options.get(&b.code).map(Vec::as_slice).unwrap_or(&[]), entity_type))
        .collect()
}

/// Header field for `behavior` on an enriched `row`.
pub fn header_field(behavior: &FieldBehavior, row: &Row, options: &[FieldOption]) -> HeaderFieldDescriptor {
    let raw = row.value(&behavior.column);
    let value = if behavior.data_type.is_multi_valued() {
        Value::List(raw.to_items())
    } else {
        raw.clone()
    };
    let display = row
        .text(&label_key(&behavior.code))
        .or_else(|| match &value {
            Value::List(items) if !items.is_empty() => Some(
                items
                    .iter()
                    .map(|item| option_label(options, &Value::text(item.clone())).unwrap_or_else(|| item.clone()))
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            other => option_label(options, other),
        });

    HeaderFieldDescriptor {
        id: behavior.code.clone(),
        label: behavior.label.clone(),
        field_type: if behavior.readonly {
            HeaderFieldType::Readonly
        } else {
            header_type(behavior.data_type)
        },
        value,
        display,
        editable: behavior.editable && !behavior.readonly,
        column: behavior.column.clone(),
        options: options.to_vec(),
    }
}

/// Info panel field: a header field that switches long text to a textarea.
pub fn info_field(behavior: &FieldBehavior, row: &Row, options: &[FieldOption]) -> HeaderFieldDescriptor {
    let mut field = header_field(behavior, row, options);
    let code = behavior.code.to_lowercase();
    if behavior.data_type == DataType::Text && LONG_TEXT.iter().any(|p| code.contains(p)) {
        field.field_type = HeaderFieldType::Textarea;
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogBuilder;
    use crate::value::row_from_json;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn behavior(entity: &str, code: &str) -> FieldBehavior {
        CatalogBuilder::new(entity)
            .build()
            .into_iter()
            .find(|b| b.code == code)
            .unwrap()
    }

    #[test]
    fn test_table_columns() {
        let mut options = OptionMap::new();
        options.insert("status".into(), vec![FieldOption::new("ip", "ip")]);
        let behaviors = CatalogBuilder::new("task").build();
        let columns = table_columns(&behaviors, &options, "task");

        let status = columns.iter().find(|c| c.id == "status").unwrap();
        assert_eq!(status.column_type, TableColumnType::Status);
        assert_eq!(status.editor, Some(EditorType::Select));
        assert_eq!(status.options.len(), 1);

        let created = columns.iter().find(|c| c.id == "created_at").unwrap();
        assert_eq!(created.column_type, TableColumnType::Datetime);
        assert_eq!(created.editor, None);

        assert!(columns.iter().find(|c| c.id == "name").unwrap().primary);
        let thumb = columns.iter().find(|c| c.id == "thumbnail_url").unwrap();
        assert_eq!((thumb.column_type, thumb.width), (TableColumnType::Thumbnail, 88));
    }

    #[test]
    fn test_header_field_display() {
        let row = row_from_json(json!({"department": 4, "department_label": "LGT", "tags": "hero, fx"}));
        let department = header_field(&behavior("task", "department"), &row, &[]);
        assert_eq!(department.display.as_deref(), Some("LGT"));
        assert_eq!(department.field_type, HeaderFieldType::Select);

        let tags = header_field(&behavior("task", "tags"), &row, &[]);
        assert_eq!(tags.value, Value::list(["hero", "fx"]));
        assert_eq!(tags.field_type, HeaderFieldType::Multiselect);

        let created = header_field(&behavior("task", "created_at"), &row, &[]);
        assert_eq!(created.field_type, HeaderFieldType::Readonly);
        assert!(!created.editable);
    }

    #[test]
    fn test_info_field_long_text() {
        let row = row_from_json(json!({"subject": "Notes on lighting"}));
        let mut subject = behavior("note", "subject");
        assert_eq!(info_field(&subject, &row, &[]).field_type, HeaderFieldType::Text);
        subject.code = "review_notes".into();
        assert_eq!(info_field(&subject, &row, &[]).field_type, HeaderFieldType::Textarea);
    }
}
