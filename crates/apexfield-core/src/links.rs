//! Entity link resolution.
//!
//! Collects every id referenced by link fields across a batch of rows and
//! resolves them with one lookup per target entity type.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::try_join_all;
use serde::Serialize;
use tracing::debug;

use crate::catalog::{FieldBehavior, AUTO_TARGET};
use crate::error::Result;
use crate::store::{Select, SharedStore};
use crate::value::{Row, RowExt, Value};

/// A table that link fields point into.
#[derive(Clone, Copy)]
pub struct LinkTarget {
    pub name: &'static str,
    pub table: &'static str,
    pub value_column: &'static str,
    /// Columns fetched for labels; the second one orders option lists.
    pub display_columns: &'static [&'static str],
    label: fn(&Row) -> String,
}

impl LinkTarget {
    pub fn label(&self, row: &Row) -> String {
        (self.label)(row)
    }

    /// Column option lists are ordered by.
    pub fn order_column(&self) -> &'static str {
        self.display_columns.get(1).copied().unwrap_or(self.value_column)
    }
}

impl std::fmt::Debug for LinkTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkTarget")
            .field("name", &self.name)
            .field("table", &self.table)
            .finish()
    }
}

fn first_or_unknown(row: &Row, keys: &[&str]) -> String {
    row.first_text(keys).unwrap_or_else(|| "Unknown".to_string())
}

fn code_and_name(row: &Row) -> String {
    match (row.text("code"), row.text("name")) {
        (Some(code), Some(name)) => format!("{code} - {name}"),
        (Some(label), None) | (None, Some(label)) => label,
        (None, None) => "Unknown".to_string(),
    }
}

fn version_label(row: &Row) -> String {
    match (row.text("code"), row.text("version_number")) {
        (Some(code), Some(number)) => format!("{code} v{number}"),
        (Some(code), None) => code,
        (None, Some(number)) => format!("v{number}"),
        (None, None) => "Unknown".to_string(),
    }
}

static TARGETS: &[LinkTarget] = &[
    LinkTarget {
        name: "profile",
        table: "profiles",
        value_column: "id",
        display_columns: &["id", "display_name", "full_name", "email", "avatar_url"],
        label: |row| first_or_unknown(row, &["display_name", "full_name", "email"]),
    },
    LinkTarget {
        name: "department",
        table: "departments",
        value_column: "id",
        display_columns: &["id", "name", "code"],
        label: |row| first_or_unknown(row, &["code", "name"]),
    },
    LinkTarget {
        name: "pipeline_step",
        table: "steps",
        value_column: "id",
        display_columns: &["id", "name", "code", "department_id"],
        label: |row| first_or_unknown(row, &["code", "name"]),
    },
    LinkTarget {
        name: "project",
        table: "projects",
        value_column: "id",
        display_columns: &["id", "name", "code"],
        label: |row| first_or_unknown(row, &["name", "code"]),
    },
    LinkTarget {
        name: "asset",
        table: "assets",
        value_column: "id",
        display_columns: &["id", "name", "code", "asset_type", "status", "description", "thumbnail_url"],
        label: code_and_name,
    },
    LinkTarget {
        name: "sequence",
        table: "sequences",
        value_column: "id",
        display_columns: &["id", "name", "code", "status", "description", "thumbnail_url"],
        label: code_and_name,
    },
    LinkTarget {
        name: "shot",
        table: "shots",
        value_column: "id",
        display_columns: &["id", "name", "code", "sequence_id", "status", "description", "thumbnail_url"],
        label: code_and_name,
    },
    LinkTarget {
        name: "task",
        table: "tasks",
        value_column: "id",
        display_columns: &["id", "name", "cached_display_name"],
        label: |row| first_or_unknown(row, &["cached_display_name", "name"]),
    },
    LinkTarget {
        name: "version",
        table: "versions",
        value_column: "id",
        display_columns: &["id", "code", "version_number"],
        label: version_label,
    },
];

/// Registered link target by name.
pub fn link_target(name: &str) -> Option<&'static LinkTarget> {
    let name = name.trim().to_lowercase();
    TARGETS.iter().find(|t| t.name == name)
}

/// Link target that a polymorphic `entity_type` value points into.
pub fn target_for_entity_type(entity_type: &str) -> Option<&'static LinkTarget> {
    match entity_type.trim().to_lowercase().as_str() {
        "person" | "user" => link_target("profile"),
        "step" => link_target("pipeline_step"),
        other => link_target(other),
    }
}

/// A resolved linked record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEntity {
    pub label: String,
    /// Display columns as fetched.
    pub row: Row,
}

/// `(target, id) → label` for one fetch cycle.
///
/// Polymorphic links are stored under the `auto` target, keyed both as
/// `entity_type:id` and as the bare id (first seen wins).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityResolutionMap {
    targets: BTreeMap<String, BTreeMap<String, ResolvedEntity>>,
}

impl EntityResolutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: &str, id: impl Into<String>, entity: ResolvedEntity) {
        self.targets
            .entry(target.to_string())
            .or_default()
            .insert(id.into(), entity);
    }

    pub fn entity(&self, target: &str, id: &str) -> Option<&ResolvedEntity> {
        self.targets.get(target)?.get(id.trim())
    }

    pub fn label(&self, target: &str, id: &str) -> Option<&str> {
        self.entity(target, id).map(|e| e.label.as_str())
    }

    /// Record behind a polymorphic link.
    pub fn polymorphic(&self, entity_type: &str, id: &str) -> Option<&ResolvedEntity> {
        let key = polymorphic_key(entity_type, id);
        self.entity(AUTO_TARGET, &key)
            .or_else(|| self.entity(AUTO_TARGET, id))
    }

    /// Labels of every id in `value`, unresolved ids skipped.
    pub fn labels(&self, target: &str, value: &Value) -> Vec<String> {
        value
            .to_items()
            .iter()
            .filter_map(|id| self.label(target, id).map(str::to_string))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.targets.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn polymorphic_key(entity_type: &str, id: &str) -> String {
    format!("{}:{}", entity_type.trim().to_lowercase(), id.trim())
}

/// Resolves link fields of a row batch.
#[derive(Clone)]
pub struct LinkResolver {
    store: SharedStore,
}

impl LinkResolver {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Resolve every link field of `behaviors` across `rows`.
    ///
    /// Issues at most one select per target table. Missing tables are skipped;
    /// any other store error fails the whole resolution.
    pub async fn resolve(&self, rows: &[Row], behaviors: &[FieldBehavior]) -> Result<EntityResolutionMap> {
        let mut wanted: BTreeMap<&'static str, BTreeSet<String>> = BTreeMap::new();
        let mut polymorphic: BTreeSet<(String, String)> = BTreeSet::new();

        for behavior in behaviors {
            let Some(target) = behavior.link_target.as_deref() else {
                continue;
            };
            if target == AUTO_TARGET {
                for row in rows {
                    let Some(entity_type) = row.text("entity_type") else {
                        continue;
                    };
                    let Some(link) = target_for_entity_type(&entity_type) else {
                        continue;
                    };
                    for id in row.value(&behavior.column).to_items() {
                        wanted.entry(link.name).or_default().insert(id.clone());
                        polymorphic.insert((entity_type.to_lowercase(), id));
                    }
                }
                continue;
            }
            let Some(link) = link_target(target) else {
                debug!(target, field = %behavior.code, "no link target registered");
                continue;
            };
            let ids = wanted.entry(link.name).or_default();
            for row in rows {
                ids.extend(row.value(&behavior.column).to_items());
            }
        }
        wanted.retain(|_, ids| !ids.is_empty());

        let lookups = wanted.into_iter().filter_map(|(name, ids)| {
            let link = link_target(name)?;
            Some(self.lookup(link, ids))
        });
        let results = try_join_all(lookups).await?;

        let mut map = EntityResolutionMap::new();
        for (link, rows) in results {
            for row in rows {
                let Some(id) = row.text(link.value_column) else {
                    continue;
                };
                let label = link.label(&row);
                map.insert(link.name, id, ResolvedEntity { label, row });
            }
        }

        for (entity_type, id) in polymorphic {
            let Some(link) = target_for_entity_type(&entity_type) else {
                continue;
            };
            let Some(entity) = map.entity(link.name, &id).cloned() else {
                continue;
            };
            if map.entity(AUTO_TARGET, &id).is_none() {
                map.insert(AUTO_TARGET, id.clone(), entity.clone());
            }
            map.insert(AUTO_TARGET, polymorphic_key(&entity_type, &id), entity);
        }

        debug!(resolved = map.len(), "links resolved");
        Ok(map)
    }

    async fn lookup(
        &self,
        link: &'static LinkTarget,
        ids: BTreeSet<String>,
    ) -> Result<(&'static LinkTarget, Vec<Row>)> {
        let query = Select::from(link.table)
            .columns(link.display_columns.iter().copied())
            .in_list(link.value_column, ids);
        match self.store.select(query).await {
            Ok(rows) => Ok((link, rows)),
            Err(error) if error.is_missing_table() => {
                debug!(table = link.table, "link table missing, skipped");
                Ok((link, Vec::new()))
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogBuilder;
    use crate::error::{Error, StoreError};
    use crate::store::MemoryStore;
    use crate::value::row_from_json;
    use serde_json::json;
    use std::sync::Arc;

    fn rows(value: serde_json::Value) -> Vec<Row> {
        match value {
            serde_json::Value::Array(items) => items.into_iter().map(row_from_json).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_labels() {
        let version = row_from_json(json!({"id": 1, "code": "SH010_comp", "version_number": 3}));
        assert_eq!(link_target("version").unwrap().label(&version), "SH010_comp v3");
        let shot = row_from_json(json!({"id": 1, "name": "Opening"}));
        assert_eq!(link_target("shot").unwrap().label(&shot), "Opening");
        let profile = row_from_json(json!({"id": "u1", "email": "a@b.c"}));
        assert_eq!(link_target("profile").unwrap().label(&profile), "a@b.c");
        assert_eq!(link_target("department").unwrap().label(&Row::new()), "Unknown");
    }

    #[tokio::test]
    async fn test_one_lookup_per_target() {
        let store = Arc::new(
            MemoryStore::new()
                .with_json_table(
                    "profiles",
                    json!([
                        {"id": "u1", "display_name": "Ana"},
                        {"id": "u2", "display_name": "Ben"},
                        {"id": "u3", "display_name": "Cy"}
                    ]),
                )
                .with_json_table("departments", json!([{"id": 4, "name": "Lighting", "code": "LGT"}])),
        );
        let tasks = rows(json!([
            {"id": 1, "assigned_to": "u1", "reviewer": ["u2", "u3"], "department": 4},
            {"id": 2, "assigned_to": "u2", "cc": "u1, u3", "department": "4"}
        ]));
        let behaviors = CatalogBuilder::new("task").build();

        let map = LinkResolver::new(store.clone()).resolve(&tasks, &behaviors).await.unwrap();

        assert_eq!(store.selects_on("profiles"), 1);
        assert_eq!(store.selects_on("departments"), 1);
        assert_eq!(map.label("profile", "u2"), Some("Ben"));
        assert_eq!(map.label("department", "4"), Some("LGT"));
        assert_eq!(map.labels("profile", &Value::text("u3, u1")), vec!["Cy", "Ana"]);
    }

    #[tokio::test]
    async fn test_polymorphic_links() {
        let store = Arc::new(
            MemoryStore::new()
                .with_json_table("shots", json!([{"id": 7, "code": "SH010", "name": "Opening", "status": "ip"}]))
                .with_json_table("assets", json!([{"id": 7, "code": "CHR", "name": "Hero"}])),
        );
        let tasks = rows(json!([
            {"id": 1, "entity_type": "shot", "entity_id": 7},
            {"id": 2, "entity_type": "asset", "entity_id": 7},
            {"id": 3, "entity_type": "playlist", "entity_id": 7}
        ]));
        let behaviors = CatalogBuilder::new("task").build();

        let map = LinkResolver::new(store.clone()).resolve(&tasks, &behaviors).await.unwrap();

        assert_eq!(map.polymorphic("shot", "7").unwrap().label, "SH010 - Opening");
        assert_eq!(map.polymorphic("Asset", "7").unwrap().label, "CHR - Hero");
        assert_eq!(store.selects_on("shots"), 1);
        assert_eq!(store.selects_on("assets"), 1);
    }

    #[tokio::test]
    async fn test_missing_table_skipped_other_errors_fail() {
        let store = Arc::new(MemoryStore::new());
        let tasks = rows(json!([{"id": 1, "assigned_to": "u1"}]));
        let behaviors = CatalogBuilder::new("task").build();
        let map = LinkResolver::new(store.clone()).resolve(&tasks, &behaviors).await.unwrap();
        assert!(map.is_empty());

        let failing = Arc::new(MemoryStore::new().with_table("profiles", Vec::new()));
        failing.fail_table("profiles", StoreError::new("42501", "permission denied"));
        let result = LinkResolver::new(failing).resolve(&tasks, &behaviors).await;
        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn test_no_links_no_queries() {
        let store = Arc::new(MemoryStore::new());
        let tasks = rows(json!([{"id": 1, "name": "Layout"}]));
        let behaviors = CatalogBuilder::new("task").build();
        LinkResolver::new(store.clone()).resolve(&tasks, &behaviors).await.unwrap();
        assert!(store.calls().is_empty());
    }
}
