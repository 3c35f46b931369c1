//! Output formatters for command results.

use apexfield_core::{ChoiceSet, CustomFieldDefinition, FieldBehavior, RuntimeField};
use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde::Serialize;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Runtime view rows.
    fn format_fields(&self, fields: &[RuntimeField]) -> String;

    /// Stored definitions.
    fn format_definitions(&self, definitions: &[CustomFieldDefinition]) -> String;

    /// Choice sets with their items.
    fn format_choice_sets(&self, sets: &[ChoiceSet]) -> String;

    /// Resolved field behaviors of one entity type.
    fn format_behaviors(&self, behaviors: &[FieldBehavior]) -> String;

    /// A simple message, optionally carrying a value.
    fn format_message(&self, message: &str, value: Option<serde_json::Value>) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        ""
    }
}

fn or_dash(value: Option<&str>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or("-").to_string()
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_fields(&self, fields: &[RuntimeField]) -> String {
        if fields.is_empty() {
            return "No fields".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec!["Id", "Entity", "Code", "Name", "Type", "Required", "Visible", "Order"]);
        for field in fields {
            table.add_row(vec![
                Cell::new(field.field_id.map(|id| id.to_string()).unwrap_or_default()),
                Cell::new(&field.entity_type),
                Cell::new(or_dash(field.code().as_deref())),
                Cell::new(or_dash(field.label().as_deref())),
                Cell::new(field.data_type.as_str()),
                Cell::new(yes_no(field.required)),
                Cell::new(yes_no(field.visible_by_default)),
                Cell::new(field.display_order),
            ]);
        }
        table.to_string()
    }

    fn format_definitions(&self, definitions: &[CustomFieldDefinition]) -> String {
        if definitions.is_empty() {
            return "No definitions".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec!["Id", "Code", "Name", "Type", "Entities", "Active"]);
        for definition in definitions {
            table.add_row(vec![
                Cell::new(definition.id.map(|id| id.to_string()).unwrap_or_default()),
                Cell::new(&definition.code),
                Cell::new(&definition.name),
                Cell::new(definition.data_type.as_str()),
                Cell::new(definition.entities.join(", ")),
                Cell::new(yes_no(definition.active)),
            ]);
        }
        table.to_string()
    }

    fn format_choice_sets(&self, sets: &[ChoiceSet]) -> String {
        if sets.is_empty() {
            return "No choice sets".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec!["Id", "Name", "Items", "Active"]);
        for set in sets {
            let items: Vec<String> = set.items.iter().map(|item| item.value.clone()).collect();
            table.add_row(vec![
                Cell::new(set.id.map(|id| id.to_string()).unwrap_or_default()),
                Cell::new(&set.name),
                Cell::new(items.join(", ")),
                Cell::new(yes_no(set.active)),
            ]);
        }
        table.to_string()
    }

    fn format_behaviors(&self, behaviors: &[FieldBehavior]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Code", "Label", "Type", "Editable", "Link", "Custom"]);
        for behavior in behaviors {
            table.add_row(vec![
                Cell::new(&behavior.code),
                Cell::new(&behavior.label),
                Cell::new(behavior.data_type.as_str()),
                Cell::new(yes_no(behavior.editable)),
                Cell::new(or_dash(behavior.link_target.as_deref())),
                Cell::new(yes_no(behavior.custom)),
            ]);
        }
        table.to_string()
    }

    fn format_message(&self, message: &str, value: Option<serde_json::Value>) -> String {
        match value {
            Some(value) => format!("{message}: {value}"),
            None => message.to_string(),
        }
    }
}

/// JSON formatter.
pub struct JsonFormatter;

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

impl Formatter for JsonFormatter {
    fn format_fields(&self, fields: &[RuntimeField]) -> String {
        to_json(fields)
    }

    fn format_definitions(&self, definitions: &[CustomFieldDefinition]) -> String {
        to_json(definitions)
    }

    fn format_choice_sets(&self, sets: &[ChoiceSet]) -> String {
        to_json(sets)
    }

    fn format_behaviors(&self, behaviors: &[FieldBehavior]) -> String {
        to_json(behaviors)
    }

    fn format_message(&self, message: &str, value: Option<serde_json::Value>) -> String {
        serde_json::json!({
            "message": message,
            "value": value,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_formats() {
        let table = create_formatter(OutputFormat::Table);
        assert_eq!(table.format_message("created field", Some(serde_json::json!(3))), "created field: 3");

        let json = create_formatter(OutputFormat::Json);
        let out: serde_json::Value = serde_json::from_str(&json.format_message("done", None)).unwrap();
        assert_eq!(out["message"], "done");
        assert!(out["value"].is_null());
    }

    #[test]
    fn test_empty_tables() {
        let table = TableFormatter;
        assert_eq!(table.format_fields(&[]), "No fields");
        assert_eq!(table.format_choice_sets(&[]), "No choice sets");
    }
}
