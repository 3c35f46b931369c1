//! Logical tables shipped with the core.
//!
//! Each logical table lists the physical table names it may live under and,
//! per semantic key, the physical column names accepted for it.

use super::resolver::ColumnCandidateSet;

/// A table whose physical name and columns drift between deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalTable {
    /// Logical name used in logs and errors.
    pub name: &'static str,
    /// Physical table names, tried in order.
    pub table_candidates: &'static [&'static str],
    /// Semantic key → physical column candidates.
    pub columns: ColumnCandidateSet,
    /// Columns assumed when the table exists but is empty.
    pub fallback_columns: &'static [&'static str],
}

pub static STATUSES: LogicalTable = LogicalTable {
    name: "status",
    table_candidates: &["statuses", "status"],
    columns: ColumnCandidateSet::new(&[
        ("id", &["id"]),
        ("name", &["name", "status_name"]),
        ("code", &["code", "short_code"]),
        ("icon", &["icon"]),
        ("color", &["color", "background_color"]),
        ("locked", &["locked_by_system", "is_system_locked", "is_locked", "is_default"]),
        ("entity_type", &["entity_type"]),
        ("sort_order", &["sort_order", "order", "order_index"]),
        ("created_by", &["created_by"]),
        ("updated_by", &["updated_by"]),
    ]),
    fallback_columns: &["id", "name", "code", "color"],
};

pub static STATUS_ENTITY_TYPES: LogicalTable = LogicalTable {
    name: "status_entity_types",
    table_candidates: &["status_entity_types"],
    columns: ColumnCandidateSet::new(&[
        ("status_id", &["status_id"]),
        ("entity_type", &["entity_type"]),
    ]),
    fallback_columns: &["status_id", "entity_type"],
};

pub static TAGS: LogicalTable = LogicalTable {
    name: "tag",
    table_candidates: &["tags", "tag"],
    columns: ColumnCandidateSet::new(&[
        ("id", &["id"]),
        ("name", &["name", "tag_name"]),
        ("color", &["color"]),
    ]),
    fallback_columns: &["id", "name"],
};

pub static DEPARTMENTS: LogicalTable = LogicalTable {
    name: "department",
    table_candidates: &["departments"],
    columns: ColumnCandidateSet::new(&[
        ("id", &["id"]),
        ("name", &["name"]),
        ("code", &["code"]),
        ("color", &["color"]),
        ("sort_order", &["order", "order_index", "sort_order"]),
    ]),
    fallback_columns: &["id", "name", "code"],
};

pub static STEPS: LogicalTable = LogicalTable {
    name: "pipeline_step",
    table_candidates: &["steps", "pipeline_steps"],
    columns: ColumnCandidateSet::new(&[
        ("id", &["id"]),
        ("name", &["name"]),
        ("code", &["code", "short_name"]),
        ("department", &["department_id", "department"]),
        ("sort_order", &["sort_order", "order", "order_index", "list_order"]),
    ]),
    fallback_columns: &["id", "name", "code", "department_id"],
};

pub static PROFILES: LogicalTable = LogicalTable {
    name: "profile",
    table_candidates: &["profiles"],
    columns: ColumnCandidateSet::new(&[
        ("id", &["id"]),
        ("display_name", &["display_name", "full_name"]),
        ("email", &["email"]),
        ("department", &["department_id"]),
        ("active", &["active", "is_active"]),
    ]),
    fallback_columns: &["id", "display_name", "email"],
};

pub static FIELD_RUNTIME: LogicalTable = LogicalTable {
    name: "field_runtime",
    table_candidates: &["schema_field_runtime_v"],
    columns: ColumnCandidateSet::new(&[
        ("column", &["column_name", "code"]),
        ("entity_type", &["entity_type"]),
        ("field_active", &["field_active"]),
        ("entity_active", &["entity_active"]),
    ]),
    fallback_columns: &["field_id", "name", "code", "column_name", "data_type", "entity_type"],
};

/// Every shipped logical table.
pub static ALL: &[&LogicalTable] = &[
    &STATUSES,
    &STATUS_ENTITY_TYPES,
    &TAGS,
    &DEPARTMENTS,
    &STEPS,
    &PROFILES,
    &FIELD_RUNTIME,
];

/// Look up a logical table by its logical name.
pub fn logical_table(name: &str) -> Option<&'static LogicalTable> {
    ALL.iter().copied().find(|t| t.name == name)
}
