//! Turning one field edit into an optimistic patch and a server payload.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::normalize::normalize_value;
use crate::catalog::FieldBehavior;
use crate::computed;
use crate::enrich::{label_key, link_label};
use crate::error::{Error, Result};
use crate::links::{self, EntityResolutionMap};
use crate::schema::candidates::STEPS;
use crate::schema::describe;
use crate::store::{Select, Store};
use crate::value::{Row, RowExt, Value};

const DEPARTMENT: &str = "department";
const STEP: &str = "step_id";

/// One field edit, optionally with companion fields the caller set explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEdit {
    pub field: String,
    pub value: Value,
    /// Other fields supplied in the same edit; never overwritten by inference.
    #[serde(default)]
    pub explicit: Row,
}

impl FieldEdit {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            explicit: Row::new(),
        }
    }

    pub fn with_explicit(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.explicit.insert(field.into(), value.into());
        self
    }
}

/// Result of preparing an edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedUpdate {
    pub field: String,
    /// Normalized value of the edited field.
    pub value: Value,
    /// Keyed by physical column; what the mutation handler receives.
    pub payload: Row,
    /// Applied to the local row before the server confirms.
    pub patch: Row,
}

/// Prepares edits for rows of one entity type.
#[derive(Debug, Clone, Copy)]
pub struct UpdatePreparer<'a> {
    entity_type: &'a str,
    behaviors: &'a [FieldBehavior],
    links: &'a EntityResolutionMap,
    today: NaiveDate,
    utc_offset_minutes: i32,
}

impl<'a> UpdatePreparer<'a> {
    pub fn new(
        entity_type: &'a str,
        behaviors: &'a [FieldBehavior],
        links: &'a EntityResolutionMap,
        today: NaiveDate,
        utc_offset_minutes: i32,
    ) -> Self {
        Self {
            entity_type,
            behaviors,
            links,
            today,
            utc_offset_minutes,
        }
    }

    fn behavior(&self, code: &str) -> Result<&'a FieldBehavior> {
        let behavior = self
            .behaviors
            .iter()
            .find(|b| b.code == code || b.column == code)
            .ok_or_else(|| Error::Validation(format!("unknown field {code} on {}", self.entity_type)))?;
        if !behavior.editable {
            return Err(Error::Validation(format!("field {code} is not editable")));
        }
        Ok(behavior)
    }

    /// Normalize the edit and derive payload and patch. Does no I/O.
    pub fn prepare(&self, row: &Row, edit: &FieldEdit) -> Result<PreparedUpdate> {
        let behavior = self.behavior(&edit.field)?;
        let value = normalize_value(behavior, edit.value.clone(), self.utc_offset_minutes)?;
        if !behavior.accepts_inline(&value) {
            return Err(Error::Validation(format!("{} does not accept this value", behavior.code)));
        }

        let mut updated = row.clone();
        updated.insert(behavior.column.clone(), value.clone());
        let mut payload = Row::new();
        payload.insert(behavior.column.clone(), value.clone());
        let mut patch = Row::new();
        patch.insert(behavior.code.clone(), value.clone());

        let mut companions = Vec::new();
        for (code, raw) in &edit.explicit {
            let companion = self.behavior(code)?;
            let normalized = normalize_value(companion, raw.clone(), self.utc_offset_minutes)?;
            updated.insert(companion.column.clone(), normalized.clone());
            payload.insert(companion.column.clone(), normalized.clone());
            patch.insert(companion.code.clone(), normalized);
            companions.push(companion);
        }

        for changed in std::iter::once(behavior).chain(companions.iter().copied()) {
            for (key, derived) in computed::recalculate(self.entity_type, &updated, &changed.column, self.today) {
                if self.behaviors.iter().any(|b| b.column == key) {
                    payload.insert(key.clone(), derived.clone());
                }
                patch.insert(key, derived);
            }
            if let Some(label) = link_label(self.links, changed, &updated) {
                patch.insert(label_key(&changed.code), Value::Text(label));
            }
        }

        Ok(PreparedUpdate {
            field: behavior.code.clone(),
            value,
            payload,
            patch,
        })
    }

    /// Fill in `department` from `step_id` or the other way round.
    ///
    /// Only applies when the entity has both columns and exactly one of them
    /// is part of the payload.
    pub async fn infer_department_step(&self, store: &dyn Store, prepared: &mut PreparedUpdate) -> Result<()> {
        let has = |column: &str| self.behaviors.iter().any(|b| b.column == column);
        if !has(DEPARTMENT) || !has(STEP) {
            return Ok(());
        }
        let department = prepared.payload.get(DEPARTMENT).cloned();
        let step = prepared.payload.get(STEP).cloned();

        match (department, step) {
            (Some(department), None) if !department.is_null() => {
                let Some(step) = lowest_step(store, &department).await? else {
                    debug!(department = %department, "department has no steps");
                    return Ok(());
                };
                let Some(step_id) = step.get("id").cloned() else {
                    return Ok(());
                };
                prepared.payload.insert(STEP.to_string(), step_id.clone());
                prepared.patch.insert(STEP.to_string(), step_id);
                if let Some(link) = links::link_target("pipeline_step") {
                    prepared.patch.insert(label_key(STEP), Value::text(link.label(&step)));
                }
            }
            (None, Some(step)) if !step.is_null() => {
                let Some(department) = step_department(store, &step).await? else {
                    debug!(step = %step, "step has no department");
                    return Ok(());
                };
                if let Some(label) = self.links.label("department", &department.to_text()) {
                    prepared.patch.insert(label_key(DEPARTMENT), Value::text(label));
                }
                prepared.payload.insert(DEPARTMENT.to_string(), department.clone());
                prepared.patch.insert(DEPARTMENT.to_string(), department);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Step with the lowest sort order under `department`.
async fn lowest_step(store: &dyn Store, department: &Value) -> Result<Option<Row>> {
    let shape = describe(store, &STEPS).await?;
    let Some(department_column) = shape.column("department") else {
        return Ok(None);
    };
    let mut query = Select::from(shape.table.as_str()).eq(department_column, department.clone());
    if let Some(sort) = shape.column("sort_order") {
        query = query.order_by(sort, true);
    }
    let rows = store.select(query.order_by("id", true).limit(1)).await?;
    Ok(rows.into_iter().next())
}

/// Department owning `step`.
async fn step_department(store: &dyn Store, step: &Value) -> Result<Option<Value>> {
    let shape = describe(store, &STEPS).await?;
    let Some(department_column) = shape.column("department") else {
        return Ok(None);
    };
    let rows = store
        .select(Select::from(shape.table.as_str()).eq("id", step.clone()).limit(1))
        .await?;
    Ok(rows
        .into_iter()
        .next()
        .map(|row| row.value(department_column).clone())
        .filter(|value| !value.is_null()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogBuilder;
    use crate::links::ResolvedEntity;
    use crate::store::MemoryStore;
    use crate::value::row_from_json;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    #[test]
    fn test_prepare_shot_cut() {
        let behaviors = CatalogBuilder::new("shot").build();
        let links = EntityResolutionMap::new();
        let preparer = UpdatePreparer::new("shot", &behaviors, &links, today(), 0);
        let row = row_from_json(json!({"id": 1, "head_in": 990, "cut_in": 1001, "cut_out": 1100, "tail_out": 1110}));

        let prepared = preparer.prepare(&row, &FieldEdit::new("cut_out", "1050")).unwrap();

        assert_eq!(prepared.value, Value::Number(1050.0));
        assert_eq!(prepared.payload["cut_out"], Value::Number(1050.0));
        assert_eq!(prepared.payload["cut_duration"], Value::Number(50.0));
        assert!(!prepared.payload.contains_key("tail_duration"));
        assert_eq!(prepared.patch["tail_duration"], Value::Number(60.0));
        assert_eq!(
            prepared.patch["frame_summary"],
            Value::text("Cut: 50f | Head: 11f | Tail: 60f | Working: 121f")
        );
    }

    #[test]
    fn test_prepare_link_label() {
        let behaviors = CatalogBuilder::new("task").build();
        let mut links = EntityResolutionMap::new();
        links.insert(
            "profile",
            "u2",
            ResolvedEntity {
                label: "Ben".into(),
                row: Row::new(),
            },
        );
        let preparer = UpdatePreparer::new("task", &behaviors, &links, today(), 0);
        let prepared = preparer
            .prepare(&Row::new(), &FieldEdit::new("assigned_to", "u2"))
            .unwrap();
        assert_eq!(prepared.patch["assigned_to_label"], Value::text("Ben"));
        assert_eq!(prepared.payload.len(), 1);
    }

    #[test]
    fn test_rejects_locked_and_unknown_fields() {
        let behaviors = CatalogBuilder::new("task").build();
        let links = EntityResolutionMap::new();
        let preparer = UpdatePreparer::new("task", &behaviors, &links, today(), 0);
        for field in ["created_at", "project_id", "reviewer", "no_such_field"] {
            let result = preparer.prepare(&Row::new(), &FieldEdit::new(field, "x"));
            assert!(matches!(result, Err(Error::Validation(_))), "{field}");
        }
    }

    #[test]
    fn test_due_date_recomputes() {
        let behaviors = CatalogBuilder::new("task").build();
        let links = EntityResolutionMap::new();
        let preparer = UpdatePreparer::new("task", &behaviors, &links, today(), 0);
        let prepared = preparer
            .prepare(&row_from_json(json!({"status": "ip"})), &FieldEdit::new("due_date", "2024-03-08"))
            .unwrap();
        assert_eq!(prepared.patch["is_overdue"], Value::Bool(true));
        assert_eq!(prepared.patch["days_overdue"], Value::from(2i64));
        assert_eq!(prepared.payload.len(), 1);
    }

    fn step_store() -> MemoryStore {
        MemoryStore::new().with_json_table(
            "steps",
            json!([
                {"id": 10, "name": "Light", "code": "LGT", "department_id": 4, "sort_order": 2},
                {"id": 11, "name": "Precomp", "code": "PRE", "department_id": 4, "sort_order": 1},
                {"id": 12, "name": "Block", "code": "BLK", "department_id": 5, "sort_order": 0}
            ]),
        )
    }

    #[tokio::test]
    async fn test_department_infers_step() {
        let store = step_store();
        let behaviors = CatalogBuilder::new("task").build();
        let links = EntityResolutionMap::new();
        let preparer = UpdatePreparer::new("task", &behaviors, &links, today(), 0);

        let mut prepared = preparer.prepare(&Row::new(), &FieldEdit::new("department", 4i64)).unwrap();
        preparer.infer_department_step(&store, &mut prepared).await.unwrap();

        assert_eq!(prepared.payload["step_id"], Value::Number(11.0));
        assert_eq!(prepared.patch["step_id_label"], Value::text("PRE"));
    }

    #[tokio::test]
    async fn test_step_infers_department() {
        let store = step_store();
        let behaviors = CatalogBuilder::new("task").build();
        let links = EntityResolutionMap::new();
        let preparer = UpdatePreparer::new("task", &behaviors, &links, today(), 0);

        let mut prepared = preparer.prepare(&Row::new(), &FieldEdit::new("step_id", 12i64)).unwrap();
        preparer.infer_department_step(&store, &mut prepared).await.unwrap();

        assert_eq!(prepared.payload["department"], Value::Number(5.0));
    }

    #[tokio::test]
    async fn test_both_explicit_left_alone() {
        let store = step_store();
        let behaviors = CatalogBuilder::new("task").build();
        let links = EntityResolutionMap::new();
        let preparer = UpdatePreparer::new("task", &behaviors, &links, today(), 0);

        let edit = FieldEdit::new("department", 4i64).with_explicit("step_id", 12i64);
        let mut prepared = preparer.prepare(&Row::new(), &edit).unwrap();
        preparer.infer_department_step(&store, &mut prepared).await.unwrap();

        assert_eq!(prepared.payload["department"], Value::Number(4.0));
        assert_eq!(prepared.payload["step_id"], Value::Number(12.0));
        assert!(store.calls().is_empty());
    }
}
