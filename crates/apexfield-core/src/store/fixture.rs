//! Field-definition procedures for the in-memory store.
//!
//! Installs in-process versions of the `schema_*` procedures so a
//! [`MemoryStore`] can back the definition store end to end (gateway fixture
//! mode, integration tests). The runtime view is kept materialized as a
//! table and rebuilt after every write.

use serde_json::json;

use super::memory::MemoryStore;
use super::{Filter, Select, StoreResult};
use crate::catalog::builtin;
use crate::error::StoreError;
use crate::value::{Row, RowExt, Value};

pub use crate::definition::store::{
    ATTACHMENTS_TABLE, CHOICE_ITEMS_TABLE, CHOICE_SETS_TABLE, FIELDS_TABLE, RUNTIME_VIEW,
};
use crate::definition::store::{
    ADD_FIELD_TO_ENTITY, BOOTSTRAP_TABLE_COLUMNS, CREATE_CHOICE_SET, CREATE_FIELD, DEACTIVATE_FIELD,
    UPDATE_FIELD_META,
};

/// Procedure changing a field's data type, installed separately so callers
/// can simulate deployments that lack it.
pub use crate::definition::store::CHANGE_FIELD_DATA_TYPE as CHANGE_DATA_TYPE;

const BOOTSTRAP_SKIP: &[&str] = &["id", "created_at", "updated_at"];

/// Create the definition tables and install every procedure except
/// [`CHANGE_DATA_TYPE`].
pub fn install_schema_procedures(store: &MemoryStore) {
    for table in [FIELDS_TABLE, ATTACHMENTS_TABLE, RUNTIME_VIEW, CHOICE_SETS_TABLE, CHOICE_ITEMS_TABLE] {
        store.create_table(table);
    }
    store.register_procedure(CREATE_FIELD, create_field);
    store.register_procedure(ADD_FIELD_TO_ENTITY, add_field_to_entity);
    store.register_procedure(UPDATE_FIELD_META, update_field_meta);
    store.register_procedure(DEACTIVATE_FIELD, deactivate_field);
    store.register_procedure(BOOTSTRAP_TABLE_COLUMNS, bootstrap_table_columns);
    store.register_procedure(CREATE_CHOICE_SET, create_choice_set);
}

/// Install [`CHANGE_DATA_TYPE`].
pub fn install_change_data_type(store: &MemoryStore) {
    store.register_procedure(CHANGE_DATA_TYPE, change_field_data_type);
}

fn raise(message: impl Into<String>) -> StoreError {
    StoreError::new("P0001", message)
}

fn arg_text(args: &serde_json::Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
}

fn arg_i64(args: &serde_json::Value, key: &str) -> Option<i64> {
    args.get(key).and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn arg_bool(args: &serde_json::Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn arg_list(args: &serde_json::Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(|s| s.trim().to_lowercase()))
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn row(pairs: Vec<(&str, Value)>) -> Row {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn find_field(store: &MemoryStore, field_id: i64) -> StoreResult<Row> {
    store
        .select_rows(&Select::from(FIELDS_TABLE).eq("id", field_id))?
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::new("P0002", format!("schema field {field_id} not found")))
}

fn attach(
    store: &MemoryStore,
    field_id: i64,
    entity_type: &str,
    required: bool,
    visible: bool,
    order: i64,
) -> StoreResult<bool> {
    let filters = [Filter::eq("field_id", field_id), Filter::eq("entity_type", entity_type)];
    let patch = row(vec![
        ("required", Value::Bool(required)),
        ("visible_by_default", Value::Bool(visible)),
        ("display_order", Value::from(order)),
        ("is_active", Value::Bool(true)),
    ]);
    if !store.update_rows(ATTACHMENTS_TABLE, &filters, &patch)?.is_empty() {
        return Ok(false);
    }
    let mut attachment = patch;
    attachment.insert("field_id".into(), Value::from(field_id));
    attachment.insert("entity_type".into(), Value::text(entity_type));
    store.insert_row(ATTACHMENTS_TABLE, attachment)?;
    Ok(true)
}

/// Rebuild the runtime view from fields and attachments.
fn refresh_runtime_view(store: &MemoryStore) -> StoreResult<()> {
    let fields = store.select_rows(&Select::from(FIELDS_TABLE))?;
    let attachments = store.select_rows(&Select::from(ATTACHMENTS_TABLE))?;
    let mut view = Vec::new();
    for attachment in &attachments {
        let field_id = attachment.text("field_id");
        let Some(field) = fields.iter().find(|f| f.id_key() == field_id) else {
            continue;
        };
        let mut entry = Row::new();
        entry.insert("field_id".into(), field.value("id").clone());
        for key in [
            "name",
            "code",
            "data_type",
            "field_type",
            "description",
            "default_value",
            "choice_set_id",
            "link_target_entities",
        ] {
            entry.insert(key.into(), field.value(key).clone());
        }
        entry.insert("column_name".into(), field.value("code").clone());
        entry.insert("field_active".into(), field.value("is_active").clone());
        entry.insert("entity_type".into(), attachment.value("entity_type").clone());
        entry.insert("entity_active".into(), attachment.value("is_active").clone());
        for key in ["required", "visible_by_default", "display_order"] {
            entry.insert(key.into(), attachment.value(key).clone());
        }
        view.push(entry);
    }
    store.replace_rows(RUNTIME_VIEW, view);
    Ok(())
}

fn create_field(store: &MemoryStore, args: serde_json::Value) -> StoreResult<serde_json::Value> {
    let name = arg_text(&args, "p_name").ok_or_else(|| raise("field name is required"))?;
    let code = arg_text(&args, "p_code")
        .map(|c| c.to_lowercase())
        .ok_or_else(|| raise("field code is required"))?;
    let entities = arg_list(&args, "p_entities");
    if entities.is_empty() {
        return Err(raise("at least one entity is required"));
    }
    if !store
        .select_rows(&Select::from(FIELDS_TABLE).eq("code", code.as_str()))?
        .is_empty()
    {
        return Err(StoreError::new(
            "23505",
            "duplicate key value violates unique constraint \"schema_fields_code_key\"",
        )
        .with_details(format!("Key (code)=({code}) already exists.")));
    }

    let field = row(vec![
        ("name", Value::text(name)),
        ("code", Value::text(code)),
        ("data_type", Value::from(arg_text(&args, "p_data_type").unwrap_or_else(|| "text".into()))),
        ("field_type", Value::from(arg_text(&args, "p_field_type").unwrap_or_else(|| "dynamic".into()))),
        ("description", Value::from(arg_text(&args, "p_description"))),
        (
            "default_value",
            Value::from(args.get("p_default_value").cloned().unwrap_or_default()),
        ),
        ("choice_set_id", Value::from(arg_i64(&args, "p_choice_set_id"))),
        ("link_target_entities", Value::List(arg_list(&args, "p_link_target_entities"))),
        ("is_active", Value::Bool(true)),
    ]);
    let field = store.insert_row(FIELDS_TABLE, field)?;
    let field_id = field
        .value("id")
        .as_f64()
        .map(|n| n as i64)
        .ok_or_else(|| raise("field insert returned no id"))?;

    let required = arg_bool(&args, "p_required", false);
    let visible = arg_bool(&args, "p_visible_by_default", true);
    let order = arg_i64(&args, "p_display_order").unwrap_or(1000);
    for entity in &entities {
        attach(store, field_id, entity, required, visible, order)?;
    }
    refresh_runtime_view(store)?;
    Ok(json!(field_id))
}

fn add_field_to_entity(store: &MemoryStore, args: serde_json::Value) -> StoreResult<serde_json::Value> {
    let field_id = arg_i64(&args, "p_field_id").ok_or_else(|| raise("field id is required"))?;
    let entity = arg_text(&args, "p_entity_type")
        .map(|e| e.to_lowercase())
        .ok_or_else(|| raise("entity type is required"))?;
    find_field(store, field_id)?;
    attach(
        store,
        field_id,
        &entity,
        arg_bool(&args, "p_required", false),
        arg_bool(&args, "p_visible_by_default", true),
        arg_i64(&args, "p_display_order").unwrap_or(1000),
    )?;
    refresh_runtime_view(store)?;
    Ok(serde_json::Value::Null)
}

fn update_field_meta(store: &MemoryStore, args: serde_json::Value) -> StoreResult<serde_json::Value> {
    let field_id = arg_i64(&args, "p_field_id").ok_or_else(|| raise("field id is required"))?;
    find_field(store, field_id)?;
    let patch: Row = match args.get("p_patch") {
        Some(serde_json::Value::Object(map)) => map
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "id" | "code" | "data_type"))
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect(),
        _ => return Err(raise("patch must be an object")),
    };
    store.update_rows(FIELDS_TABLE, &[Filter::eq("id", field_id)], &patch)?;
    refresh_runtime_view(store)?;
    Ok(serde_json::Value::Null)
}

fn change_field_data_type(store: &MemoryStore, args: serde_json::Value) -> StoreResult<serde_json::Value> {
    let field_id = arg_i64(&args, "p_field_id").ok_or_else(|| raise("field id is required"))?;
    let data_type = arg_text(&args, "p_data_type").ok_or_else(|| raise("data type is required"))?;
    let field = find_field(store, field_id)?;
    if field.text("field_type").as_deref() == Some("system_owned") {
        return Err(raise("cannot change the data type of a system owned field"));
    }
    let patch = row(vec![("data_type", Value::text(data_type.to_lowercase()))]);
    store.update_rows(FIELDS_TABLE, &[Filter::eq("id", field_id)], &patch)?;
    refresh_runtime_view(store)?;
    Ok(serde_json::Value::Null)
}

fn deactivate_field(store: &MemoryStore, args: serde_json::Value) -> StoreResult<serde_json::Value> {
    let field_id = arg_i64(&args, "p_field_id").ok_or_else(|| raise("field id is required"))?;
    find_field(store, field_id)?;
    let patch = row(vec![
        ("is_active", Value::Bool(false)),
        ("deactivated_reason", Value::from(arg_text(&args, "p_reason"))),
    ]);
    store.update_rows(FIELDS_TABLE, &[Filter::eq("id", field_id)], &patch)?;
    refresh_runtime_view(store)?;
    Ok(serde_json::Value::Null)
}

fn bootstrap_table_columns(store: &MemoryStore, args: serde_json::Value) -> StoreResult<serde_json::Value> {
    let entities: Vec<&str> = match arg_text(&args, "p_entity_type") {
        Some(entity) => match builtin::ENTITY_TYPES.iter().find(|e| **e == entity.to_lowercase()) {
            Some(entity) => vec![*entity],
            None => return Err(raise(format!("unknown entity type {entity}"))),
        },
        None => builtin::ENTITY_TYPES.to_vec(),
    };

    let mut count = 0_i64;
    for entity in entities {
        let Some(table) = builtin::entity_table(entity) else {
            continue;
        };
        let Ok(rows) = store.select_rows(&Select::from(table).limit(1)) else {
            continue;
        };
        let Some(sample) = rows.into_iter().next() else {
            continue;
        };
        for column in sample.keys().filter(|c| !BOOTSTRAP_SKIP.contains(&c.as_str())) {
            let existing = store
                .select_rows(&Select::from(FIELDS_TABLE).eq("code", column.as_str()))?
                .into_iter()
                .next();
            let field_id = match existing {
                Some(field) => field.value("id").as_f64().map(|n| n as i64),
                None => {
                    let field = row(vec![
                        ("name", Value::text(title_case(column))),
                        ("code", Value::text(column.clone())),
                        ("data_type", Value::text("text")),
                        ("field_type", Value::text("permanent")),
                        ("link_target_entities", Value::List(Vec::new())),
                        ("is_active", Value::Bool(true)),
                    ]);
                    store
                        .insert_row(FIELDS_TABLE, field)?
                        .value("id")
                        .as_f64()
                        .map(|n| n as i64)
                }
            };
            let Some(field_id) = field_id else {
                continue;
            };
            let unlinked = store
                .select_rows(
                    &Select::from(ATTACHMENTS_TABLE)
                        .eq("field_id", field_id)
                        .eq("entity_type", entity),
                )?
                .is_empty();
            if unlinked {
                attach(store, field_id, entity, false, false, 1000)?;
                count += 1;
            }
        }
    }
    refresh_runtime_view(store)?;
    Ok(json!(count))
}

fn create_choice_set(store: &MemoryStore, args: serde_json::Value) -> StoreResult<serde_json::Value> {
    let name = arg_text(&args, "p_name").ok_or_else(|| raise("choice set name is required"))?;
    let set = store.insert_row(
        CHOICE_SETS_TABLE,
        row(vec![
            ("name", Value::text(name)),
            ("description", Value::from(arg_text(&args, "p_description"))),
            ("is_active", Value::Bool(true)),
        ]),
    )?;
    let set_id = set.value("id").clone();
    let items = args.get("p_items").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    for (index, item) in items.iter().enumerate() {
        let Some(value) = arg_text(item, "value") else {
            continue;
        };
        let label = arg_text(item, "label").unwrap_or_else(|| value.clone());
        store.insert_row(
            CHOICE_ITEMS_TABLE,
            row(vec![
                ("choice_set_id", set_id.clone()),
                ("value", Value::text(value)),
                ("label", Value::text(label)),
                ("color", Value::from(arg_text(item, "color"))),
                ("sort_order", Value::from(arg_i64(item, "sort_order").unwrap_or(index as i64))),
                ("is_active", Value::Bool(true)),
            ]),
        )?;
    }
    Ok(serde_json::Value::from(set_id))
}

fn title_case(column: &str) -> String {
    column
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn test_create_field_materializes_view() {
        let store = MemoryStore::new();
        install_schema_procedures(&store);
        let id = store
            .call(
                "schema_create_field",
                json!({"p_name": "Bid", "p_code": "bid", "p_data_type": "float",
                       "p_entities": ["task", "shot"], "p_display_order": 5}),
            )
            .await
            .unwrap();
        assert_eq!(id, json!(1));

        let view = store.rows(RUNTIME_VIEW).unwrap();
        assert_eq!(view.len(), 2);
        assert!(view.iter().all(|r| r.text("column_name").as_deref() == Some("bid")));
        assert!(view.iter().all(|r| r.text("display_order").as_deref() == Some("5")));
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let store = MemoryStore::new();
        install_schema_procedures(&store);
        let args = json!({"p_name": "Bid", "p_code": "bid", "p_entities": ["task"]});
        store.call("schema_create_field", args.clone()).await.unwrap();
        let err = store.call("schema_create_field", args).await.unwrap_err();
        assert_eq!(err.code.as_deref(), Some("23505"));
    }

    #[tokio::test]
    async fn test_bootstrap_counts_new_attachments() {
        let store = MemoryStore::new().with_json_table(
            "shots",
            json!([{"id": 1, "code": "sh010", "cut_in": 1001, "created_at": "2024-01-01"}]),
        );
        install_schema_procedures(&store);
        let count = store
            .call("schema_bootstrap_table_columns", json!({"p_entity_type": "shot"}))
            .await
            .unwrap();
        assert_eq!(count, json!(2));

        // second run links nothing new
        let count = store
            .call("schema_bootstrap_table_columns", json!({"p_entity_type": "shot"}))
            .await
            .unwrap();
        assert_eq!(count, json!(0));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("cut_in"), "Cut In");
        assert_eq!(title_case("code"), "Code");
    }
}
