//! Consumer API.
//!
//! One fetch cycle: build the catalog, then load options and resolve links
//! concurrently, then enrich. Nothing is cached between cycles.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{entity_table, CatalogBuilder, FieldBehavior};
use crate::config::CoreConfig;
use crate::definition::DefinitionStore;
use crate::descriptors::{self, HeaderFieldDescriptor, TableColumnDescriptor};
use crate::enrich::RowEnricher;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::fetch::{FetchOutcome, FetchTracker};
use crate::links::{EntityResolutionMap, LinkResolver};
use crate::options::{OptionLoader, OptionMap};
use crate::schema::discover_columns;
use crate::store::SharedStore;
use crate::update::{Dispatcher, FieldEdit, MutationRegistry, PreparedUpdate, UpdatePreparer};
use crate::value::{Row, RowExt};

/// Everything a table view needs for one batch of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityView {
    pub entity_type: String,
    pub fields: Vec<FieldBehavior>,
    pub columns: Vec<TableColumnDescriptor>,
    pub options: OptionMap,
    pub rows: Vec<Row>,
}

/// Result of a dispatched edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutcome {
    /// Optimistic patch, to keep once the write is confirmed.
    pub patch: Row,
    /// What was sent to the mutation handler.
    pub payload: Row,
    /// Row as returned by the handler.
    pub stored: Row,
}

#[derive(Clone)]
pub struct FieldService {
    store: SharedStore,
    definitions: DefinitionStore,
    options: OptionLoader,
    links: LinkResolver,
    dispatcher: Dispatcher,
    tracker: FetchTracker,
    utc_offset_minutes: i32,
    today: Option<NaiveDate>,
}

impl FieldService {
    /// Service with store-backed mutation handlers for every entity type.
    pub fn new(store: SharedStore, config: CoreConfig) -> Self {
        let registry = MutationRegistry::with_store_handlers(store.clone());
        Self::with_definitions(DefinitionStore::new(store, config), registry)
    }

    pub fn with_definitions(definitions: DefinitionStore, registry: MutationRegistry) -> Self {
        let store = definitions.store().clone();
        Self {
            utc_offset_minutes: definitions.config().utc_offset_minutes,
            options: OptionLoader::new(definitions.clone()),
            links: LinkResolver::new(store.clone()),
            dispatcher: Dispatcher::new(registry, EventBus::default()),
            tracker: FetchTracker::new(),
            today: None,
            definitions,
            store,
        }
    }

    /// Pin the date used by derived columns.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn definitions(&self) -> &DefinitionStore {
        &self.definitions
    }

    pub fn events(&self) -> &EventBus {
        self.dispatcher.events()
    }

    pub fn tracker(&self) -> &FetchTracker {
        &self.tracker
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| {
            (Utc::now() + Duration::minutes(i64::from(self.utc_offset_minutes))).date_naive()
        })
    }

    fn entity(entity_type: &str) -> Result<(String, &'static str)> {
        let entity_type = entity_type.trim().to_lowercase();
        let table = entity_table(&entity_type)
            .ok_or_else(|| Error::NotFound(format!("unknown entity type {entity_type}")))?;
        Ok((entity_type, table))
    }

    /// Ordered field behaviors of `entity_type`.
    pub async fn field_definitions(&self, entity_type: &str) -> Result<Vec<FieldBehavior>> {
        let (entity_type, table) = Self::entity(entity_type)?;
        let (custom, present) = tokio::try_join!(
            self.definitions.runtime_fields(&entity_type),
            discover_columns(self.store.as_ref(), table),
        )?;
        let present: Option<BTreeSet<String>> = present;
        let mut builder = CatalogBuilder::new(&entity_type).with_custom_fields(&custom);
        if let Some(columns) = present.as_ref() {
            builder = builder.with_present_columns(columns);
        }
        let fields = builder.build();
        debug!(entity_type, fields = fields.len(), custom = custom.len(), "catalog built");
        Ok(fields)
    }

    pub async fn load_options(&self, entity_type: &str) -> Result<OptionMap> {
        let fields = self.field_definitions(entity_type).await?;
        self.options.load(&fields).await
    }

    pub async fn resolve_links(&self, entity_type: &str, rows: &[Row]) -> Result<EntityResolutionMap> {
        let fields = self.field_definitions(entity_type).await?;
        self.links.resolve(rows, &fields).await
    }

    pub async fn enrich_row(&self, entity_type: &str, row: &Row) -> Result<Row> {
        let mut rows = self.enrich_rows(entity_type, std::slice::from_ref(row)).await?;
        Ok(rows.pop().unwrap_or_default())
    }

    pub async fn enrich_rows(&self, entity_type: &str, rows: &[Row]) -> Result<Vec<Row>> {
        let (entity_type, _) = Self::entity(entity_type)?;
        let fields = self.field_definitions(&entity_type).await?;
        let links = self.links.resolve(rows, &fields).await?;
        let today = self.today();
        Ok(RowEnricher::new(&entity_type, &fields, &links, today).enrich_all(rows))
    }

    /// Full fetch cycle for a view.
    ///
    /// Options and links load concurrently and both must succeed. When a
    /// newer fetch for `view` started meanwhile the result is discarded.
    pub async fn fetch(&self, view: &str, entity_type: &str, rows: Vec<Row>) -> Result<FetchOutcome<EntityView>> {
        let ticket = self.tracker.begin(view);
        let (entity_type, _) = Self::entity(entity_type)?;
        let fields = self.field_definitions(&entity_type).await?;

        let (options, links) = tokio::try_join!(self.options.load(&fields), self.links.resolve(&rows, &fields))?;

        if !ticket.is_current() {
            info!(view, generation = ticket.generation(), "stale fetch discarded");
            return Ok(FetchOutcome::Superseded);
        }

        let rows = RowEnricher::new(&entity_type, &fields, &links, self.today()).enrich_all(&rows);
        let columns = descriptors::table_columns(&fields, &options, &entity_type);
        Ok(FetchOutcome::Applied(EntityView {
            entity_type,
            fields,
            columns,
            options,
            rows,
        }))
    }

    pub async fn table_columns(&self, entity_type: &str) -> Result<Vec<TableColumnDescriptor>> {
        let (entity_type, _) = Self::entity(entity_type)?;
        let fields = self.field_definitions(&entity_type).await?;
        let options = self.options.load(&fields).await?;
        Ok(descriptors::table_columns(&fields, &options, &entity_type))
    }

    /// Header fields for one row; `info` switches long text to textareas.
    pub async fn header_fields(&self, entity_type: &str, row: &Row, info: bool) -> Result<Vec<HeaderFieldDescriptor>> {
        let (entity_type, _) = Self::entity(entity_type)?;
        let fields = self.field_definitions(&entity_type).await?;
        let rows = std::slice::from_ref(row);
        let (options, links) = tokio::try_join!(self.options.load(&fields), self.links.resolve(rows, &fields))?;
        let enriched = RowEnricher::new(&entity_type, &fields, &links, self.today()).enrich(row);

        Ok(fields
            .iter()
            .map(|field| {
                let field_options = options.get(&field.code).map(Vec::as_slice).unwrap_or(&[]);
                if info {
                    descriptors::info_field(field, &enriched, field_options)
                } else {
                    descriptors::header_field(field, &enriched, field_options)
                }
            })
            .collect())
    }

    /// Prepare an edit of `row` without sending it.
    pub async fn prepare_update(&self, entity_type: &str, row: &Row, edit: &FieldEdit) -> Result<PreparedUpdate> {
        let (entity_type, _) = Self::entity(entity_type)?;
        let fields = self.field_definitions(&entity_type).await?;

        let mut probe = row.clone();
        probe.insert(edit.field.clone(), edit.value.clone());
        probe.extend(edit.explicit.clone());
        let links = self.links.resolve(std::slice::from_ref(&probe), &fields).await?;

        let preparer = UpdatePreparer::new(&entity_type, &fields, &links, self.today(), self.utc_offset_minutes);
        let mut prepared = preparer.prepare(row, edit)?;
        preparer.infer_department_step(self.store.as_ref(), &mut prepared).await?;
        Ok(prepared)
    }

    /// Prepare and dispatch an edit.
    ///
    /// On error the caller rolls back its optimistic patch; nothing is retried.
    pub async fn update_field(&self, entity_type: &str, row: &Row, edit: &FieldEdit) -> Result<UpdateOutcome> {
        let id = row
            .id_key()
            .ok_or_else(|| Error::Validation("row has no id".into()))?;
        let prepared = self.prepare_update(entity_type, row, edit).await?;
        let stored = self
            .dispatcher
            .dispatch(&entity_type.trim().to_lowercase(), &id, prepared.payload.clone())
            .await?;
        Ok(UpdateOutcome {
            patch: prepared.patch,
            payload: prepared.payload,
            stored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{Filter, MemoryStore, Select, Store, StoreResult};
    use crate::value::{row_from_json, Value};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::{Arc, OnceLock};

    /// Starts a newer fetch of `view` while a select on `table` is in flight.
    struct Refetching {
        inner: Arc<MemoryStore>,
        tracker: OnceLock<FetchTracker>,
        view: &'static str,
        table: &'static str,
    }

    #[async_trait]
    impl Store for Refetching {
        async fn select(&self, query: Select) -> StoreResult<Vec<Row>> {
            if query.table == self.table {
                if let Some(tracker) = self.tracker.get() {
                    tracker.begin(self.view);
                }
            }
            self.inner.select(query).await
        }

        async fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
            self.inner.insert(table, row).await
        }

        async fn update(&self, table: &str, filters: Vec<Filter>, patch: Row) -> StoreResult<Vec<Row>> {
            self.inner.update(table, filters, patch).await
        }

        async fn delete(&self, table: &str, filters: Vec<Filter>) -> StoreResult<Vec<Row>> {
            self.inner.delete(table, filters).await
        }

        async fn call(&self, procedure: &str, args: serde_json::Value) -> StoreResult<serde_json::Value> {
            self.inner.call(procedure, args).await
        }

        async fn describe_table(&self, table: &str) -> StoreResult<Option<BTreeSet<String>>> {
            self.inner.describe_table(table).await
        }
    }

    fn service(store: Arc<MemoryStore>) -> FieldService {
        FieldService::new(store, CoreConfig::default()).with_today(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap())
    }

    #[tokio::test]
    async fn test_unknown_entity_type() {
        let service = service(Arc::new(MemoryStore::new()));
        assert!(matches!(service.field_definitions("playlist").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_field_round_trip() {
        let store = Arc::new(MemoryStore::new().with_json_table(
            "shots",
            json!([{"id": 3, "code": "SH030", "cut_in": 1001, "cut_out": 1040, "cut_duration": 40}]),
        ));
        let service = service(store.clone());
        let mut events = service.events().subscribe();
        let row = row_from_json(json!({"id": 3, "cut_in": 1001, "cut_out": 1040}));

        let outcome = service
            .update_field("shot", &row, &FieldEdit::new("cut_out", 1060i64))
            .await
            .unwrap();

        assert_eq!(outcome.stored.value("cut_duration"), &Value::Number(60.0));
        assert_eq!(outcome.patch["cut_duration"], Value::Number(60.0));
        assert_eq!(events.recv().await.unwrap().entity_type, "shot");
    }

    #[tokio::test]
    async fn test_superseded_fetch() {
        let store = Arc::new(MemoryStore::new().with_json_table("tasks", json!([{"id": 1, "name": "Comp"}])));
        let service = service(store);
        let rows = vec![row_from_json(json!({"id": 1, "name": "Comp"}))];

        let stale = service.tracker().begin("tasks");
        let applied = service.fetch("tasks", "task", rows).await.unwrap();
        assert!(!stale.is_current());
        let view = applied.into_applied().unwrap();
        assert_eq!(view.rows.len(), 1);
        assert!(view.columns.iter().any(|c| c.id == "name" && c.editable));
    }

    #[tokio::test]
    async fn test_fetch_superseded_while_in_flight() {
        let memory = Arc::new(
            MemoryStore::new()
                .with_json_table("tasks", json!([{"id": 1, "name": "Comp", "assigned_to": "u1"}]))
                .with_json_table("profiles", json!([{"id": "u1", "display_name": "Ana"}])),
        );
        let store = Arc::new(Refetching {
            inner: memory.clone(),
            tracker: OnceLock::new(),
            view: "tasks",
            table: "profiles",
        });
        let service = FieldService::new(store.clone(), CoreConfig::default())
            .with_today(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        let _ = store.tracker.set(service.tracker().clone());
        let rows = vec![row_from_json(json!({"id": 1, "assigned_to": "u1"}))];

        let outcome = service.fetch("tasks", "task", rows.clone()).await.unwrap();

        assert!(outcome.is_superseded());
        assert!(memory.selects_on("profiles") >= 1);

        // another view is unaffected
        let outcome = service.fetch("task-detail", "task", rows).await.unwrap();
        let view = outcome.into_applied().unwrap();
        assert_eq!(view.rows[0].value("assigned_to_label"), &Value::text("Ana"));
    }

    #[tokio::test]
    async fn test_fetch_surfaces_option_failure() {
        let store = Arc::new(
            MemoryStore::new()
                .with_json_table("tasks", json!([{"id": 1, "name": "Comp", "status": "ip"}]))
                .with_json_table("statuses", json!([{"id": 1, "name": "In Progress"}]))
                .with_json_table("profiles", json!([{"id": "u1", "display_name": "Ana"}])),
        );
        store.fail_table("statuses", StoreError::new("42501", "permission denied for table statuses"));
        let service = service(store);
        let rows = vec![row_from_json(json!({"id": 1, "assigned_to": "u1"}))];

        let links = service.resolve_links("task", &rows).await.unwrap();
        assert_eq!(links.label("profile", "u1"), Some("Ana"));

        let err = service.fetch("tasks", "task", rows).await.unwrap_err();
        match err {
            Error::Store(error) => assert_eq!(error.code.as_deref(), Some("42501")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
