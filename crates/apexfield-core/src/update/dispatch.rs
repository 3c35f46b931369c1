//! Routing prepared payloads to per-entity mutation handlers.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::catalog::{builtin, entity_table};
use crate::definition::store::FIELDS_TABLE;
use crate::error::{Error, Result};
use crate::events::{EventBus, MutationEvent};
use crate::schema::{discover_columns, pick_writable_columns};
use crate::store::{Filter, SharedStore};
use crate::value::Row;

/// Entity-specific update action.
///
/// Receives a payload keyed by physical column and returns the stored row,
/// or an error message that is passed to the caller verbatim.
#[async_trait]
pub trait MutationHandler: Send + Sync {
    async fn update(&self, id: &str, payload: Row) -> std::result::Result<Row, String>;
}

/// Handler writing straight to the entity's table.
///
/// Columns are re-discovered on every write; unknown and denied columns are
/// dropped from the payload.
pub struct StoreMutationHandler {
    store: SharedStore,
    table: String,
    deny: Vec<String>,
}

impl StoreMutationHandler {
    pub fn new(store: SharedStore, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            deny: Vec::new(),
        }
    }

    pub fn with_deny<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny.extend(columns.into_iter().map(Into::into));
        self
    }

    async fn write(&self, id: &str, payload: Row) -> Result<Row> {
        let columns = discover_columns(self.store.as_ref(), &self.table)
            .await?
            .unwrap_or_else(|| payload.keys().cloned().collect::<BTreeSet<_>>());
        let deny: Vec<&str> = self
            .deny
            .iter()
            .map(String::as_str)
            .chain(builtin::SYSTEM_READONLY.iter().copied())
            .collect();
        let writable = pick_writable_columns(&columns, &payload, &deny);
        if writable.is_empty() {
            return Err(Error::Validation(format!("nothing writable for {}", self.table)));
        }
        let updated = self
            .store
            .update(&self.table, vec![Filter::eq("id", id)], writable)
            .await?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("{} row {id}", self.table)))
    }
}

#[async_trait]
impl MutationHandler for StoreMutationHandler {
    async fn update(&self, id: &str, payload: Row) -> std::result::Result<Row, String> {
        self.write(id, payload).await.map_err(|e| e.to_string())
    }
}

/// Entity types with a mutation handler in a complete deployment.
pub const MUTABLE_ENTITY_TYPES: &[&str] = &[
    "project",
    "asset",
    "shot",
    "sequence",
    "task",
    "version",
    "note",
    "published_file",
    "tag",
    "status",
    "department",
    "custom_field",
];

/// Handlers keyed by entity type.
#[derive(Clone, Default)]
pub struct MutationRegistry {
    handlers: HashMap<String, Arc<dyn MutationHandler>>,
}

impl MutationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A [`StoreMutationHandler`] for every mutable entity type.
    pub fn with_store_handlers(store: SharedStore) -> Self {
        let mut registry = Self::new();
        for entity_type in MUTABLE_ENTITY_TYPES {
            let table = match *entity_type {
                "tag" => "tags",
                "status" => "statuses",
                "custom_field" => FIELDS_TABLE,
                other => match entity_table(other) {
                    Some(table) => table,
                    None => continue,
                },
            };
            let handler = StoreMutationHandler::new(store.clone(), table)
                .with_deny(builtin::structural_deny(entity_type).iter().copied());
            registry.register(entity_type, Arc::new(handler));
        }
        registry
    }

    pub fn register(&mut self, entity_type: &str, handler: Arc<dyn MutationHandler>) {
        self.handlers.insert(entity_type.trim().to_lowercase(), handler);
    }

    pub fn get(&self, entity_type: &str) -> Option<Arc<dyn MutationHandler>> {
        self.handlers.get(&entity_type.trim().to_lowercase()).cloned()
    }

    pub fn entity_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Sends payloads to handlers and announces successful writes.
#[derive(Clone)]
pub struct Dispatcher {
    registry: MutationRegistry,
    events: EventBus,
}

impl Dispatcher {
    pub fn new(registry: MutationRegistry, events: EventBus) -> Self {
        Self { registry, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &MutationRegistry {
        &self.registry
    }

    /// Dispatch `payload` for row `id` of `entity_type`.
    ///
    /// Handler failures come back as [`Error::Upstream`] with the handler's
    /// message unchanged. Nothing is retried.
    pub async fn dispatch(&self, entity_type: &str, id: &str, payload: Row) -> Result<Row> {
        let Some(handler) = self.registry.get(entity_type) else {
            return Err(Error::Upstream(format!(
                "No update action registered for entity: {entity_type}"
            )));
        };
        let columns: Vec<String> = payload.keys().cloned().collect();
        debug!(entity_type, id, ?columns, "dispatching update");

        let stored = handler.update(id, payload).await.map_err(Error::Upstream)?;

        info!(entity_type, id, "update committed");
        self.events.publish(MutationEvent::new(entity_type, id, columns));
        Ok(stored)
    }
}
