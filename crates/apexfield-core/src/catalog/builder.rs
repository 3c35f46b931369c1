//! Merges compiled and custom field metadata into one behavior list.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::builtin::{self, AUTO_TARGET};
use super::inference::{default_width, infer_data_type, link_data_type};
use super::types::{FieldBehavior, OptionSource, UiType};
use crate::computed;
use crate::definition::{DataType, FieldType, RuntimeField};

/// Builds the behavior list of one entity type.
///
/// Built-in columns come first, custom fields attached to the entity type are
/// merged over them by column, and the result is sorted by display order.
#[derive(Debug, Clone)]
pub struct CatalogBuilder<'a> {
    entity_type: String,
    custom: &'a [RuntimeField],
    present: Option<&'a BTreeSet<String>>,
    exclude: BTreeSet<String>,
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into().trim().to_lowercase(),
            custom: &[],
            present: None,
            exclude: BTreeSet::new(),
        }
    }

    /// Runtime rows of custom fields. Rows for other entity types are ignored.
    pub fn with_custom_fields(mut self, fields: &'a [RuntimeField]) -> Self {
        self.custom = fields;
        self
    }

    /// Physical columns known to exist. Without it every column is assumed present.
    pub fn with_present_columns(mut self, columns: &'a BTreeSet<String>) -> Self {
        self.present = Some(columns);
        self
    }

    pub fn exclude<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn build(&self) -> Vec<FieldBehavior> {
        let mut by_column: BTreeMap<String, FieldBehavior> = BTreeMap::new();

        for (index, column) in builtin::builtin_columns(&self.entity_type).iter().enumerate() {
            let behavior = self.builtin_behavior(index, column);
            by_column.insert(behavior.column.clone(), behavior);
        }

        for field in self.custom {
            if !field.entity_type.trim().eq_ignore_ascii_case(&self.entity_type) {
                continue;
            }
            if !field.field_active || !field.entity_active || field.field_type == FieldType::SystemOwned {
                continue;
            }
            let Some(column) = field.column() else {
                debug!(entity = %self.entity_type, field = ?field.code, "custom field without column skipped");
                continue;
            };
            match by_column.get_mut(column) {
                Some(existing) => self.overlay(existing, field),
                None => {
                    let behavior = self.custom_behavior(column, field);
                    by_column.insert(behavior.column.clone(), behavior);
                }
            }
        }

        let mut behaviors: Vec<FieldBehavior> = by_column
            .into_values()
            .filter(|b| !self.exclude.contains(&b.code) && !self.exclude.contains(&b.column))
            .collect();
        for behavior in &mut behaviors {
            behavior.editable = self.is_editable(behavior);
        }
        behaviors.sort_by(|a, b| a.display_order.cmp(&b.display_order).then_with(|| a.code.cmp(&b.code)));
        behaviors
    }

    fn builtin_behavior(&self, index: usize, column: &builtin::BuiltinColumn) -> FieldBehavior {
        let link_target = builtin::link_target(&self.entity_type, column.column);
        let data_type = match link_target {
            Some(AUTO_TARGET) => DataType::Entity,
            Some(_) if link_data_type(column.pg_type) == DataType::MultiEntity => DataType::MultiEntity,
            Some(_) => DataType::List,
            None => infer_data_type(column.column, column.pg_type),
        };
        let visible = builtin::default_visible(&self.entity_type);

        FieldBehavior {
            code: column.column.to_string(),
            label: column.label.to_string(),
            column: column.column.to_string(),
            data_type,
            field_type: FieldType::Permanent,
            ui: ui_type(&self.entity_type, data_type, link_target, None),
            editable: false,
            readonly: builtin::SYSTEM_READONLY.contains(&column.column),
            link_target: link_target.map(str::to_string),
            display_order: index as i64 * 10,
            width: default_width(data_type),
            visible_by_default: visible.is_empty() || visible.contains(&column.column),
            required: false,
            custom: false,
        }
    }

    fn custom_behavior(&self, column: &str, field: &RuntimeField) -> FieldBehavior {
        let data_type = field.data_type;
        let link_target = link_target_of(field);
        FieldBehavior {
            code: field.code().unwrap_or_else(|| column.to_string()),
            label: field.label().unwrap_or_else(|| column.to_string()),
            column: column.to_string(),
            data_type,
            field_type: field.field_type,
            ui: ui_type(&self.entity_type, data_type, link_target.as_deref(), field.choice_set_id),
            editable: false,
            readonly: builtin::SYSTEM_READONLY.contains(&column),
            link_target,
            display_order: field.display_order,
            width: default_width(data_type),
            visible_by_default: field.visible_by_default,
            required: field.required,
            custom: true,
        }
    }

    /// A definition over a compiled column refines its presentation; the
    /// stored type wins only when it says more than plain text.
    fn overlay(&self, existing: &mut FieldBehavior, field: &RuntimeField) {
        if let Some(label) = field.label() {
            existing.label = label;
        }
        existing.display_order = field.display_order;
        existing.visible_by_default = field.visible_by_default;
        existing.required = field.required;
        if field.data_type != DataType::Text && existing.link_target.is_none() {
            existing.data_type = field.data_type;
            existing.width = default_width(field.data_type);
        }
        if let Some(target) = link_target_of(field).filter(|_| existing.link_target.is_none()) {
            existing.link_target = Some(target);
        }
        existing.ui = ui_type(
            &self.entity_type,
            existing.data_type,
            existing.link_target.as_deref(),
            field.choice_set_id,
        );
    }

    fn is_editable(&self, behavior: &FieldBehavior) -> bool {
        if behavior.readonly || behavior.field_type == FieldType::SystemOwned {
            return false;
        }
        if builtin::structural_deny(&self.entity_type).contains(&behavior.column.as_str()) {
            return false;
        }
        if behavior.data_type.is_non_editable() || behavior.ui == UiType::ReadOnly {
            return false;
        }
        if computed::is_computed(&self.entity_type, &behavior.column) {
            return false;
        }
        match self.present {
            Some(present) => present.contains(&behavior.column),
            None => true,
        }
    }
}

fn link_target_of(field: &RuntimeField) -> Option<String> {
    if !matches!(field.data_type, DataType::Entity | DataType::MultiEntity) {
        return None;
    }
    field
        .link_target_entities
        .first()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
}

/// UI type for a data type on `entity_type`.
pub fn ui_type(entity_type: &str, data_type: DataType, link_target: Option<&str>, choice_set: Option<i64>) -> UiType {
    let choice = choice_set.map(|id| OptionSource::ChoiceSet { id });
    match data_type {
        DataType::StatusList => UiType::Select {
            source: choice.unwrap_or_else(|| OptionSource::Status {
                entity_type: entity_type.to_string(),
            }),
        },
        DataType::TagList => UiType::MultiSelect {
            source: choice.unwrap_or(OptionSource::Tags),
        },
        DataType::List => match (choice, link_target) {
            (Some(source), _) => UiType::Select { source },
            (None, Some(target)) if target != AUTO_TARGET => UiType::Select {
                source: OptionSource::EntityTable {
                    target: target.to_string(),
                },
            },
            _ => UiType::Text,
        },
        DataType::Checkbox => UiType::Boolean,
        DataType::Date => UiType::Date,
        DataType::DateTime => UiType::DateTime,
        dt if dt.is_numeric() => UiType::Number,
        dt if dt.is_non_editable() => UiType::ReadOnly,
        _ => UiType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn runtime(value: serde_json::Value) -> RuntimeField {
        serde_json::from_value(value).unwrap()
    }

    fn find<'a>(behaviors: &'a [FieldBehavior], code: &str) -> &'a FieldBehavior {
        behaviors.iter().find(|b| b.code == code).unwrap()
    }

    #[test]
    fn test_builtin_task_catalog() {
        let behaviors = CatalogBuilder::new("task").build();

        let status = find(&behaviors, "status");
        assert_eq!(status.data_type, DataType::StatusList);
        assert_eq!(
            status.ui,
            UiType::Select {
                source: OptionSource::Status { entity_type: "task".into() }
            }
        );
        assert!(status.editable);

        let department = find(&behaviors, "department");
        assert_eq!(department.link_target.as_deref(), Some("department"));
        assert!(department.editable);

        let reviewer = find(&behaviors, "reviewer");
        assert_eq!(reviewer.data_type, DataType::MultiEntity);
        assert!(!reviewer.editable);

        let link = find(&behaviors, "entity_id");
        assert!(link.is_polymorphic());
        assert!(!link.editable);

        assert!(find(&behaviors, "created_at").readonly);
        assert!(!find(&behaviors, "project_id").editable);
        assert!(!find(&behaviors, "thumbnail_url").editable);
        assert!(find(&behaviors, "name").visible_by_default);
        assert!(!find(&behaviors, "bid").visible_by_default);
    }

    #[test]
    fn test_ordering_is_stable() {
        let behaviors = CatalogBuilder::new("shot").build();
        let orders: Vec<i64> = behaviors.iter().map(|b| b.display_order).collect();
        let mut sorted = orders.clone();
        sorted.sort();
        assert_eq!(orders, sorted);
        assert_eq!(behaviors[0].code, "id");
    }

    #[test]
    fn test_computed_column_not_editable() {
        let behaviors = CatalogBuilder::new("shot").build();
        assert!(!find(&behaviors, "cut_duration").editable);
        assert!(find(&behaviors, "cut_in").editable);
    }

    #[test]
    fn test_custom_fields_merge() {
        let fields = vec![
            runtime(json!({
                "field_id": 1, "name": "Vendor", "code": "vendor", "column_name": "vendor",
                "data_type": "list", "entity_type": "task", "choice_set_id": 4, "display_order": 5
            })),
            runtime(json!({
                "field_id": 2, "name": "Client Priority", "code": "priority", "column_name": "priority",
                "data_type": "list", "entity_type": "task", "choice_set_id": 9, "display_order": 2000
            })),
            runtime(json!({
                "field_id": 3, "name": "Internal", "code": "internal", "column_name": "internal",
                "data_type": "text", "field_type": "system_owned", "entity_type": "task"
            })),
            runtime(json!({
                "field_id": 4, "name": "Retired", "code": "retired", "column_name": "retired",
                "data_type": "text", "entity_type": "task", "field_active": false
            })),
            runtime(json!({
                "field_id": 5, "name": "Virtual", "code": "virtual", "column_name": null,
                "data_type": "calculated", "entity_type": "task"
            })),
            runtime(json!({
                "field_id": 6, "name": "Shot only", "code": "shot_only", "column_name": "shot_only",
                "data_type": "text", "entity_type": "shot"
            })),
        ];
        let behaviors = CatalogBuilder::new("task").with_custom_fields(&fields).build();

        let vendor = find(&behaviors, "vendor");
        assert!(vendor.custom);
        assert_eq!(vendor.ui, UiType::Select { source: OptionSource::ChoiceSet { id: 4 } });
        assert_eq!(vendor.display_order, 5);

        let priority = find(&behaviors, "priority");
        assert!(!priority.custom);
        assert_eq!(priority.label, "Client Priority");
        assert_eq!(priority.data_type, DataType::List);
        assert_eq!(priority.display_order, 2000);

        for code in ["internal", "retired", "virtual", "shot_only"] {
            assert!(behaviors.iter().all(|b| b.code != code), "{code}");
        }
        assert_eq!(behaviors.iter().filter(|b| b.column == "priority").count(), 1);
    }

    #[test]
    fn test_missing_column_not_editable() {
        let present: BTreeSet<String> = ["id", "name"].into_iter().map(String::from).collect();
        let behaviors = CatalogBuilder::new("task").with_present_columns(&present).build();
        assert!(find(&behaviors, "name").editable);
        assert!(!find(&behaviors, "priority").editable);
    }

    #[test]
    fn test_exclusions() {
        let behaviors = CatalogBuilder::new("task").exclude(["bid", "cc"]).build();
        assert!(behaviors.iter().all(|b| b.code != "bid" && b.code != "cc"));
    }

    #[test]
    fn test_custom_entity_field_is_read_only() {
        let fields = vec![runtime(json!({
            "field_id": 7, "name": "Supervisor", "code": "supervisor", "column_name": "supervisor",
            "data_type": "entity", "entity_type": "asset", "link_target_entities": ["Profile"]
        }))];
        let behaviors = CatalogBuilder::new("asset").with_custom_fields(&fields).build();
        let supervisor = find(&behaviors, "supervisor");
        assert_eq!(supervisor.link_target.as_deref(), Some("profile"));
        assert_eq!(supervisor.ui, UiType::ReadOnly);
        assert!(!supervisor.editable);
    }
}
