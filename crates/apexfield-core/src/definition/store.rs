//! Custom field definition store.
//!
//! Writes go through the store's `schema_*` procedures; reads come from the
//! definition tables and the field runtime view.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

use super::migration::{MigrationChain, MigrationError};
use super::types::{
    AttachOptions, ChoiceSet, ChoiceSetItem, CustomFieldDefinition, DataType, FieldPatch, NewChoiceSet,
    NewField, Patch, RuntimeField, DEFAULT_DISPLAY_ORDER,
};
use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::store::{Select, SharedStore};
use crate::value::{Row, RowExt};

pub const CREATE_FIELD: &str = "schema_create_field";
pub const ADD_FIELD_TO_ENTITY: &str = "schema_add_field_to_entity";
pub const UPDATE_FIELD_META: &str = "schema_update_field_meta";
pub const CHANGE_FIELD_DATA_TYPE: &str = "schema_change_field_data_type";
pub const DEACTIVATE_FIELD: &str = "schema_deactivate_field";
pub const BOOTSTRAP_TABLE_COLUMNS: &str = "schema_bootstrap_table_columns";
pub const CREATE_CHOICE_SET: &str = "schema_create_choice_set";

pub const FIELDS_TABLE: &str = "schema_fields";
pub const ATTACHMENTS_TABLE: &str = "schema_field_entities";
pub const RUNTIME_VIEW: &str = "schema_field_runtime_v";
pub const CHOICE_SETS_TABLE: &str = "schema_choice_sets";
pub const CHOICE_ITEMS_TABLE: &str = "schema_choice_set_items";

/// Persisted, user-extensible field metadata.
#[derive(Clone)]
pub struct DefinitionStore {
    store: SharedStore,
    config: CoreConfig,
    migration: Option<Arc<MigrationChain>>,
}

impl std::fmt::Debug for DefinitionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionStore")
            .field("migration", &self.migration)
            .finish_non_exhaustive()
    }
}

fn normalize_list(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim().to_lowercase();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn parse_data_type(raw: &str) -> Result<DataType> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::Validation("data type is required".into()));
    }
    raw.parse::<DataType>().map_err(Error::Validation)
}

fn decode<T: DeserializeOwned>(row: &Row) -> Result<T> {
    Ok(serde_json::from_value(row.to_json())?)
}

fn id_from(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl DefinitionStore {
    pub fn new(store: SharedStore, config: CoreConfig) -> Self {
        Self {
            store,
            config,
            migration: None,
        }
    }

    /// Use a fixed migration chain instead of building one from the
    /// environment at call time.
    pub fn with_migration(mut self, chain: MigrationChain) -> Self {
        self.migration = Some(Arc::new(chain));
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    async fn call_procedure(&self, procedure: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        match self.store.call(procedure, args).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_missing_procedure(procedure) => Err(Error::ProcedureMissing {
                procedure: procedure.to_string(),
                message: e.message,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a field and attach it to every listed entity type.
    ///
    /// Returns the new field id.
    pub async fn create(&self, input: NewField) -> Result<i64> {
        let name = non_empty(Some(&input.name)).ok_or_else(|| Error::Validation("field name is required".into()))?;
        let code = non_empty(Some(&input.code))
            .map(|c| c.to_lowercase())
            .ok_or_else(|| Error::Validation("field code is required".into()))?;
        let entities = normalize_list(&input.entities);
        if entities.is_empty() {
            return Err(Error::Validation("at least one entity is required".into()));
        }
        let data_type = match input.data_type.as_deref() {
            Some(raw) => parse_data_type(raw)?,
            None => DataType::Text,
        };

        let args = json!({
            "p_name": name,
            "p_code": code,
            "p_data_type": data_type.as_str(),
            "p_field_type": input.field_type.unwrap_or_default().as_str(),
            "p_description": non_empty(input.description.as_deref()),
            "p_default_value": input.default_value,
            "p_choice_set_id": input.choice_set_id,
            "p_entities": entities,
            "p_required": input.required,
            "p_visible_by_default": input.visible_by_default.unwrap_or(true),
            "p_display_order": input.display_order.unwrap_or(DEFAULT_DISPLAY_ORDER),
            "p_link_target_entities": normalize_list(&input.link_target_entities),
        });
        let result = self.call_procedure(CREATE_FIELD, args).await?;
        let id = id_from(&result)
            .ok_or_else(|| Error::Upstream(format!("{CREATE_FIELD} returned no field id: {result}")))?;
        info!(field_id = id, code = %code, "field created");
        Ok(id)
    }

    /// Attach a field to an entity type. Re-attaching updates the overrides.
    pub async fn attach_to_entity(&self, field_id: i64, entity_type: &str, options: AttachOptions) -> Result<()> {
        let entity_type = entity_type.trim().to_lowercase();
        if entity_type.is_empty() {
            return Err(Error::Validation("entity type is required".into()));
        }
        self.call_procedure(
            ADD_FIELD_TO_ENTITY,
            json!({
                "p_field_id": field_id,
                "p_entity_type": entity_type,
                "p_required": options.required,
                "p_visible_by_default": options.visible_by_default.unwrap_or(true),
                "p_display_order": options.display_order.unwrap_or(DEFAULT_DISPLAY_ORDER),
            }),
        )
        .await?;
        debug!(field_id, entity_type = %entity_type, "field attached");
        Ok(())
    }

    /// Merge `patch` into the field's metadata.
    ///
    /// A `data_type` entry goes through [`Self::change_data_type`] first; the
    /// remaining entries are forwarded in one call, and only if any remain.
    pub async fn patch_meta(&self, field_id: i64, mut patch: FieldPatch) -> Result<()> {
        match patch.take("data_type") {
            None | Some(Patch::Keep) => {}
            Some(Patch::Clear) => return Err(Error::Validation("data type is required".into())),
            Some(Patch::Set(value)) => {
                let raw = value.as_str().unwrap_or_default().to_string();
                self.change_data_type(field_id, &raw).await?;
            }
        }

        let payload = patch.sanitized();
        if payload.is_empty() {
            return Ok(());
        }
        self.call_procedure(
            UPDATE_FIELD_META,
            json!({ "p_field_id": field_id, "p_patch": payload }),
        )
        .await?;
        Ok(())
    }

    /// Change a field's data type.
    ///
    /// When the change procedure is missing, the migration chain runs once
    /// and the procedure is retried once.
    pub async fn change_data_type(&self, field_id: i64, data_type: &str) -> Result<()> {
        let data_type = parse_data_type(data_type)?;
        let args = json!({ "p_field_id": field_id, "p_data_type": data_type.as_str() });

        let primary = match self.call_procedure(CHANGE_FIELD_DATA_TYPE, args.clone()).await {
            Ok(_) => return Ok(()),
            Err(Error::ProcedureMissing { message, .. }) => message,
            Err(e) => return Err(e),
        };
        warn!(field_id, error = %primary, "data type procedure missing, applying migration");

        let chain = match &self.migration {
            Some(chain) => chain.clone(),
            None => Arc::new(MigrationChain::from_config(self.store.clone(), &self.config)),
        };
        let applied = match chain.run().await {
            Ok(applied) => applied,
            Err(attempts) => {
                return Err(MigrationError {
                    procedure: CHANGE_FIELD_DATA_TYPE.to_string(),
                    primary,
                    attempts,
                    applied: None,
                    retry: None,
                }
                .into());
            }
        };

        match self.store.call(CHANGE_FIELD_DATA_TYPE, args).await {
            Ok(_) => {
                info!(field_id, data_type = %data_type, strategy = %applied.strategy, "data type changed after migration");
                Ok(())
            }
            Err(e) => Err(MigrationError {
                procedure: CHANGE_FIELD_DATA_TYPE.to_string(),
                primary,
                attempts: applied.failures,
                applied: Some(applied.strategy),
                retry: Some(e.message),
            }
            .into()),
        }
    }

    /// Deactivate a field. Stored values are kept.
    pub async fn deactivate(&self, field_id: i64, reason: Option<&str>) -> Result<()> {
        self.call_procedure(
            DEACTIVATE_FIELD,
            json!({ "p_field_id": field_id, "p_reason": non_empty(reason) }),
        )
        .await?;
        info!(field_id, "field deactivated");
        Ok(())
    }

    /// Reconcile existing physical columns into field definitions.
    ///
    /// Returns the number of definitions inserted or linked.
    pub async fn bootstrap(&self, entity_type: Option<&str>) -> Result<i64> {
        let entity_type = non_empty(entity_type).map(|e| e.to_lowercase());
        let result = self
            .call_procedure(BOOTSTRAP_TABLE_COLUMNS, json!({ "p_entity_type": entity_type }))
            .await?;
        let count = id_from(&result).unwrap_or(0);
        info!(entity_type = entity_type.as_deref().unwrap_or("all"), count, "bootstrap finished");
        Ok(count)
    }

    /// Runtime view rows, ordered by entity type, display order and name.
    pub async fn list_fields(&self, entity_type: Option<&str>) -> Result<Vec<RuntimeField>> {
        let mut query = Select::from(RUNTIME_VIEW)
            .order_by("entity_type", true)
            .order_by("display_order", true)
            .order_by("name", true);
        if let Some(entity_type) = non_empty(entity_type) {
            query = query.eq("entity_type", entity_type.to_lowercase());
        }
        let rows = self.store.select(query).await?;
        rows.iter().map(decode).collect()
    }

    /// Active fields attached to `entity_type`. A missing view yields none.
    pub async fn runtime_fields(&self, entity_type: &str) -> Result<Vec<RuntimeField>> {
        let query = Select::from(RUNTIME_VIEW)
            .eq("entity_type", entity_type.trim().to_lowercase())
            .eq("field_active", true)
            .eq("entity_active", true)
            .order_by("display_order", true)
            .order_by("name", true);
        match self.store.select(query).await {
            Ok(rows) => rows.iter().map(decode).collect(),
            Err(e) if e.is_missing_table() => {
                warn!(entity_type, "field runtime view missing, no custom fields");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Field definitions ordered by name, with their attached entity types.
    pub async fn list_definitions(&self, include_inactive: bool) -> Result<Vec<CustomFieldDefinition>> {
        let mut query = Select::from(FIELDS_TABLE).order_by("name", true);
        if !include_inactive {
            query = query.eq("is_active", true);
        }
        let rows = self.store.select(query).await?;
        let mut definitions: Vec<CustomFieldDefinition> = rows.iter().map(decode).collect::<Result<_>>()?;

        let attachments = match self
            .store
            .select(Select::from(ATTACHMENTS_TABLE).order_by("entity_type", true))
            .await
        {
            Ok(rows) => rows,
            Err(e) if e.is_missing_table() => {
                debug!("attachment table missing, definitions listed without entities");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        let mut by_field: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for attachment in &attachments {
            if attachment.value("is_active").as_bool() == Some(false) {
                continue;
            }
            if let (Some(field_id), Some(entity)) = (attachment.text("field_id"), attachment.text("entity_type")) {
                by_field.entry(field_id).or_default().push(entity);
            }
        }
        for definition in &mut definitions {
            if let Some(entities) = definition.id.and_then(|id| by_field.remove(&id.to_string())) {
                definition.entities = entities;
            }
        }
        Ok(definitions)
    }

    /// Choice sets ordered by name, items ordered by sort order then id.
    pub async fn list_choice_sets(&self, include_inactive: bool) -> Result<Vec<ChoiceSet>> {
        let mut sets_query = Select::from(CHOICE_SETS_TABLE).order_by("name", true);
        let mut items_query = Select::from(CHOICE_ITEMS_TABLE)
            .order_by("sort_order", true)
            .order_by("id", true);
        if !include_inactive {
            sets_query = sets_query.eq("is_active", true);
            items_query = items_query.eq("is_active", true);
        }
        let (sets, items) = tokio::try_join!(self.store.select(sets_query), self.store.select(items_query))?;

        let mut by_set: BTreeMap<String, Vec<ChoiceSetItem>> = BTreeMap::new();
        for row in &items {
            let Some(set_id) = row.text("choice_set_id") else {
                continue;
            };
            by_set.entry(set_id).or_default().push(decode(row)?);
        }
        sets.iter()
            .map(|row| {
                let mut set: ChoiceSet = decode(row)?;
                set.items = row
                    .id_key()
                    .and_then(|id| by_set.remove(&id))
                    .unwrap_or_default();
                Ok(set)
            })
            .collect()
    }

    /// One choice set with its active items.
    pub async fn choice_set(&self, id: i64) -> Result<Option<ChoiceSet>> {
        Ok(self
            .list_choice_sets(false)
            .await?
            .into_iter()
            .find(|set| set.id == Some(id)))
    }

    /// Create a choice set. Returns its id.
    pub async fn create_choice_set(&self, input: NewChoiceSet) -> Result<i64> {
        let name = non_empty(Some(&input.name))
            .ok_or_else(|| Error::Validation("choice set name is required".into()))?;

        let mut items = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        for item in &input.items {
            let Some(value) = non_empty(Some(&item.value)) else {
                continue;
            };
            if seen.contains(&value) {
                return Err(Error::Validation(format!("duplicate choice value: {value}")));
            }
            seen.push(value.clone());
            items.push(json!({
                "value": value,
                "label": non_empty(item.label.as_deref()).unwrap_or_else(|| value.clone()),
                "color": non_empty(item.color.as_deref()),
                "sort_order": item.sort_order,
            }));
        }

        let result = self
            .call_procedure(
                CREATE_CHOICE_SET,
                json!({
                    "p_name": name,
                    "p_description": non_empty(input.description.as_deref()),
                    "p_items": items,
                }),
            )
            .await?;
        id_from(&result)
            .ok_or_else(|| Error::Upstream(format!("{CREATE_CHOICE_SET} returned no id: {result}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::types::NewChoiceItem;
    use crate::store::fixture::{install_change_data_type, install_schema_procedures};
    use crate::store::MemoryStore;

    fn definitions() -> (Arc<MemoryStore>, DefinitionStore) {
        let memory = Arc::new(MemoryStore::new());
        install_schema_procedures(&memory);
        install_change_data_type(&memory);
        let store = DefinitionStore::new(memory.clone(), CoreConfig::new());
        (memory, store)
    }

    #[tokio::test]
    async fn test_create_normalizes_input() {
        let (memory, store) = definitions();
        let id = store
            .create(
                NewField::new(" Bid Days ", "  Bid_Days ")
                    .with_data_type("FLOAT")
                    .with_entities(["Task", "shot", "task", " "]),
            )
            .await
            .unwrap();
        assert_eq!(id, 1);

        let fields = store.list_fields(None).await.unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].entity_type, "shot");
        assert_eq!(fields[0].code().as_deref(), Some("bid_days"));
        assert_eq!(fields[0].data_type, DataType::Float);
        assert_eq!(fields[0].display_order, DEFAULT_DISPLAY_ORDER);
        assert!(fields[0].visible_by_default);
        assert_eq!(memory.calls_to(CREATE_FIELD), 1);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (memory, store) = definitions();
        let err = store.create(NewField::new("Bid", "bid")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = store
            .create(NewField::new("  ", "bid").with_entities(["task"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = store
            .create(NewField::new("Bid", "bid").with_entities(["task"]).with_data_type("money"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(memory.calls_to(CREATE_FIELD), 0);
    }

    #[tokio::test]
    async fn test_attach_is_idempotent() {
        let (_, store) = definitions();
        let id = store
            .create(NewField::new("Bid", "bid").with_entities(["task"]))
            .await
            .unwrap();
        let options = AttachOptions {
            required: true,
            visible_by_default: Some(false),
            display_order: Some(5),
        };
        store.attach_to_entity(id, "Shot", options.clone()).await.unwrap();
        store.attach_to_entity(id, "shot", options).await.unwrap();

        let shot = store.list_fields(Some("shot")).await.unwrap();
        assert_eq!(shot.len(), 1);
        assert!(shot[0].required);
        assert!(!shot[0].visible_by_default);
        assert_eq!(shot[0].display_order, 5);
    }

    #[tokio::test]
    async fn test_patch_meta_forwards_sanitized_keys() {
        let (memory, store) = definitions();
        let id = store
            .create(NewField::new("Bid", "bid").with_entities(["task"]))
            .await
            .unwrap();
        store
            .patch_meta(
                id,
                FieldPatch::new()
                    .set("name", "Bid Days")
                    .clear("description")
                    .maybe::<bool>("required", None),
            )
            .await
            .unwrap();

        let args = memory
            .calls()
            .into_iter()
            .find_map(|call| match call {
                crate::store::StoreCall::Call { procedure, args } if procedure == UPDATE_FIELD_META => Some(args),
                _ => None,
            })
            .unwrap();
        assert_eq!(args["p_patch"], json!({"name": "Bid Days", "description": null}));

        // nothing left to forward: no call
        store.patch_meta(id, FieldPatch::new().keep("name")).await.unwrap();
        assert_eq!(memory.calls_to(UPDATE_FIELD_META), 1);
    }

    #[tokio::test]
    async fn test_patch_meta_routes_data_type() {
        let (memory, store) = definitions();
        let id = store
            .create(NewField::new("Bid", "bid").with_entities(["task"]))
            .await
            .unwrap();
        store
            .patch_meta(id, FieldPatch::new().set("data_type", "number"))
            .await
            .unwrap();
        assert_eq!(memory.calls_to(CHANGE_FIELD_DATA_TYPE), 1);
        assert_eq!(memory.calls_to(UPDATE_FIELD_META), 0);
        let fields = store.runtime_fields("task").await.unwrap();
        assert_eq!(fields[0].data_type, DataType::Number);

        let err = store
            .patch_meta(id, FieldPatch::new().set("data_type", " "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_deactivate_hides_runtime_field() {
        let (_, store) = definitions();
        let id = store
            .create(NewField::new("Bid", "bid").with_entities(["task"]))
            .await
            .unwrap();
        store.deactivate(id, Some("  ")).await.unwrap();
        assert!(store.runtime_fields("task").await.unwrap().is_empty());
        assert_eq!(store.list_definitions(false).await.unwrap().len(), 0);

        let all = store.list_definitions(true).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].active);
        assert_eq!(all[0].entities, vec!["task"]);
    }

    #[tokio::test]
    async fn test_runtime_fields_without_view() {
        let store = DefinitionStore::new(Arc::new(MemoryStore::new()), CoreConfig::new());
        assert!(store.runtime_fields("task").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_choice_sets() {
        let (_, store) = definitions();
        let id = store
            .create_choice_set(NewChoiceSet {
                name: " Priority ".into(),
                description: None,
                items: vec![
                    NewChoiceItem { value: " high ".into(), sort_order: Some(2), ..Default::default() },
                    NewChoiceItem { value: "low".into(), label: Some("Low".into()), sort_order: Some(1), ..Default::default() },
                    NewChoiceItem { value: "  ".into(), ..Default::default() },
                ],
            })
            .await
            .unwrap();

        let set = store.choice_set(id).await.unwrap().unwrap();
        assert_eq!(set.name, "Priority");
        let values: Vec<&str> = set.items.iter().map(|i| i.value.as_str()).collect();
        assert_eq!(values, vec!["low", "high"]);
        assert_eq!(set.items[1].display_label(), "high");

        let err = store
            .create_choice_set(NewChoiceSet {
                name: "Dup".into(),
                description: None,
                items: vec![
                    NewChoiceItem { value: "a".into(), ..Default::default() },
                    NewChoiceItem { value: " a".into(), ..Default::default() },
                ],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
