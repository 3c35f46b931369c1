//! Field behavior types.

use serde::{Deserialize, Serialize};

use crate::definition::{DataType, FieldType};
use crate::value::Value;

/// Where a select field's options come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptionSource {
    /// Statuses scoped to an entity type.
    Status { entity_type: String },
    /// The global tag list.
    Tags,
    /// Rows of a linked entity table.
    EntityTable { target: String },
    /// Items of a choice set.
    ChoiceSet { id: i64 },
}

/// UI-facing field type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UiType {
    Text,
    Number,
    Boolean,
    Date,
    DateTime,
    Select { source: OptionSource },
    MultiSelect { source: OptionSource },
    ReadOnly,
}

impl UiType {
    pub fn source(&self) -> Option<&OptionSource> {
        match self {
            UiType::Select { source } | UiType::MultiSelect { source } => Some(source),
            _ => None,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, UiType::MultiSelect { .. })
    }
}

/// Runtime descriptor of one field on one entity type.
///
/// Built fresh by the catalog for every fetch cycle; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBehavior {
    /// Identifier, equal to the physical column.
    pub code: String,
    pub label: String,
    pub column: String,
    pub data_type: DataType,
    pub field_type: FieldType,
    pub ui: UiType,
    pub editable: bool,
    /// System column or otherwise never writable.
    pub readonly: bool,
    /// Linked entity type, `auto` for polymorphic links.
    pub link_target: Option<String>,
    pub display_order: i64,
    /// Default column width in pixels.
    pub width: u32,
    pub visible_by_default: bool,
    pub required: bool,
    /// Defined through the custom field store rather than compiled in.
    pub custom: bool,
}

impl FieldBehavior {
    /// Whether `value` may be edited inline in this field.
    ///
    /// Lists are only accepted by multi-select fields.
    pub fn accepts_inline(&self, value: &Value) -> bool {
        if !self.editable {
            return false;
        }
        match value {
            Value::List(_) => self.ui.is_multi(),
            _ => true,
        }
    }

    /// Whether this field holds an id (or ids) of another entity.
    pub fn is_link(&self) -> bool {
        self.link_target.is_some()
    }

    pub fn is_polymorphic(&self) -> bool {
        self.link_target.as_deref() == Some(super::builtin::AUTO_TARGET)
    }

    pub fn option_source(&self) -> Option<&OptionSource> {
        self.ui.source()
    }
}
