//! Option loading for select fields.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{FieldBehavior, OptionSource, AUTO_TARGET};
use crate::definition::DefinitionStore;
use crate::error::{Error, Result};
use crate::links;
use crate::schema::candidates::{STATUSES, TAGS};
use crate::schema::describe;
use crate::store::{Select, SharedStore};
use crate::value::{Row, RowExt, Value};

/// One permissible value of a select field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl FieldOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: Option<String>) -> Self {
        self.color = color;
        self
    }
}

/// Options keyed by field code.
pub type OptionMap = BTreeMap<String, Vec<FieldOption>>;

/// Loads options for every select field of a behavior list.
#[derive(Clone)]
pub struct OptionLoader {
    store: SharedStore,
    definitions: DefinitionStore,
    mapping_table: String,
}

impl OptionLoader {
    pub fn new(definitions: DefinitionStore) -> Self {
        let mapping_table = definitions.config().status_mapping_table.clone();
        Self {
            store: definitions.store().clone(),
            definitions,
            mapping_table,
        }
    }

    /// Options of every select-capable field in `behaviors`.
    ///
    /// Each distinct source is loaded once, all sources concurrently.
    pub async fn load(&self, behaviors: &[FieldBehavior]) -> Result<OptionMap> {
        let mut sources: Vec<&OptionSource> = Vec::new();
        for source in behaviors.iter().filter_map(FieldBehavior::option_source) {
            if is_loadable(source) && !sources.contains(&source) {
                sources.push(source);
            }
        }

        let loaded = try_join_all(sources.iter().map(|source| self.load_source(source))).await?;
        let by_source: HashMap<&OptionSource, Vec<FieldOption>> = sources.into_iter().zip(loaded).collect();

        let mut options = OptionMap::new();
        for behavior in behaviors {
            if let Some(list) = behavior.option_source().and_then(|s| by_source.get(s)) {
                options.insert(behavior.code.clone(), list.clone());
            }
        }
        debug!(fields = options.len(), sources = by_source.len(), "options loaded");
        Ok(options)
    }

    pub async fn load_source(&self, source: &OptionSource) -> Result<Vec<FieldOption>> {
        match source {
            OptionSource::Status { entity_type } => self.statuses(entity_type).await,
            OptionSource::Tags => self.tags().await,
            OptionSource::EntityTable { target } => self.entity_options(target).await,
            OptionSource::ChoiceSet { id } => self.choice_set(*id).await,
        }
    }

    /// Statuses applicable to `entity_type`.
    ///
    /// A status is included when it is mapped to the entity type or to `all`.
    /// Without a mapping table the status row's own `entity_type` column is
    /// used, and a status with no mapping at all applies everywhere.
    pub async fn statuses(&self, entity_type: &str) -> Result<Vec<FieldOption>> {
        let shape = match describe(self.store.as_ref(), &STATUSES).await {
            Ok(shape) => shape,
            Err(Error::NotFound(message)) => {
                debug!(%message, "no status table");
                return Ok(Vec::new());
            }
            Err(error) => return Err(error),
        };
        let rows = self.store.select(Select::from(shape.table.as_str())).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mapping = self.status_mapping().await?;

        let name_column = shape.column("name").unwrap_or("name");
        let sort_column = shape.column("sort_order");
        let color_column = shape.column("color");
        let type_column = shape.column("entity_type");
        let target = entity_type.trim().to_lowercase();

        let mut rows = rows;
        rows.sort_by(|a, b| {
            // Rows without a sort key go last.
            let by_order = match sort_column {
                Some(column) => match (a.value(column).as_f64(), b.value(column).as_f64()) {
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                },
                None => Ordering::Equal,
            };
            by_order.then_with(|| {
                let x = a.value(name_column).to_text().to_lowercase();
                let y = b.value(name_column).to_text().to_lowercase();
                x.cmp(&y)
            })
        });

        let mut seen = HashSet::new();
        let mut options = Vec::new();
        for row in &rows {
            let Some(name) = row.text(name_column) else {
                continue;
            };
            let applies_to: Vec<String> = match &mapping {
                Some(mapping) => row
                    .id_key()
                    .and_then(|id| mapping.get(&id).cloned())
                    .unwrap_or_else(|| vec!["all".to_string()]),
                None => vec![type_column
                    .and_then(|c| row.text(c))
                    .map(|t| t.to_lowercase())
                    .unwrap_or_else(|| "all".to_string())],
            };
            if !applies_to.iter().any(|t| t == "all" || *t == target) {
                continue;
            }
            if !seen.insert(name.to_lowercase()) {
                continue;
            }
            let color = color_column.and_then(|c| row.text(c));
            options.push(FieldOption::new(name.clone(), name).with_color(color));
        }
        Ok(options)
    }

    /// Status id → mapped entity types. `None` when the mapping table is missing;
    /// any other store error is returned.
    async fn status_mapping(&self) -> Result<Option<HashMap<String, Vec<String>>>> {
        let query = Select::from(self.mapping_table.as_str()).columns(["status_id", "entity_type"]);
        let rows = match self.store.select(query).await {
            Ok(rows) => rows,
            Err(error) if error.is_missing_table() => {
                debug!(table = %self.mapping_table, %error, "no status mapping table, using status rows");
                return Ok(None);
            }
            Err(error) => return Err(error.into()),
        };
        let mut mapping: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let (Some(status_id), Some(entity_type)) = (row.text("status_id"), row.text("entity_type")) else {
                continue;
            };
            mapping
                .entry(status_id)
                .or_default()
                .push(entity_type.to_lowercase());
        }
        Ok(Some(mapping))
    }

    /// Every tag name, deduplicated and sorted.
    pub async fn tags(&self) -> Result<Vec<FieldOption>> {
        let shape = match describe(self.store.as_ref(), &TAGS).await {
            Ok(shape) => shape,
            Err(Error::NotFound(_)) => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };
        let name_column = shape.column("name").unwrap_or("name");
        let rows = self
            .store
            .select(Select::from(shape.table.as_str()).columns([name_column]))
            .await?;
        let names: BTreeSet<String> = rows.iter().filter_map(|row| row.text(name_column)).collect();
        Ok(sorted_unique(names.into_iter().map(|n| FieldOption::new(n.clone(), n))))
    }

    /// Rows of a link target as options: value is the id, label per target.
    pub async fn entity_options(&self, target: &str) -> Result<Vec<FieldOption>> {
        let Some(link) = links::link_target(target) else {
            return Ok(Vec::new());
        };
        let query = Select::from(link.table)
            .columns(link.display_columns.iter().copied())
            .order_by(link.order_column(), true);
        let rows = match self.store.select(query).await {
            Ok(rows) => rows,
            Err(error) if error.is_missing_table() => {
                debug!(table = link.table, "option table missing");
                return Ok(Vec::new());
            }
            Err(error) => return Err(error.into()),
        };
        Ok(sorted_unique(rows.iter().filter_map(|row: &Row| {
            let id = row.text(link.value_column)?;
            Some(FieldOption::new(id, link.label(row)))
        })))
    }

    /// Active items of a choice set, in set order.
    pub async fn choice_set(&self, id: i64) -> Result<Vec<FieldOption>> {
        let Some(set) = self.definitions.choice_set(id).await? else {
            return Ok(Vec::new());
        };
        Ok(set
            .items
            .iter()
            .filter(|item| item.active)
            .map(|item| {
                FieldOption::new(item.value.clone(), item.display_label()).with_color(item.color.clone())
            })
            .collect())
    }
}

fn is_loadable(source: &OptionSource) -> bool {
    match source {
        OptionSource::EntityTable { target } => target != AUTO_TARGET && target != "project",
        _ => true,
    }
}

/// Dedupe by value, then sort by label case-insensitively.
fn sorted_unique(options: impl Iterator<Item = FieldOption>) -> Vec<FieldOption> {
    let mut seen = HashSet::new();
    let mut unique: Vec<FieldOption> = options.filter(|o| seen.insert(o.value.clone())).collect();
    unique.sort_by_cached_key(|o| o.label.to_lowercase());
    unique
}

/// Label of `value` among `options`, falling back to the value itself.
pub fn option_label(options: &[FieldOption], value: &Value) -> Option<String> {
    let text = value.non_empty_text()?;
    Some(
        options
            .iter()
            .find(|o| o.value == text)
            .map(|o| o.label.clone())
            .unwrap_or(text),
    )
}
