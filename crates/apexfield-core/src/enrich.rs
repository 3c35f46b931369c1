//! Display-ready rows.
//!
//! Enrichment only adds keys: resolved link labels, polymorphic entity
//! details and derived columns. Values already present in the row are
//! never changed.

use chrono::NaiveDate;

use crate::catalog::FieldBehavior;
use crate::computed;
use crate::links::EntityResolutionMap;
use crate::value::{Row, RowExt, Value};

/// Resolved label of a link field in `row`; several ids are joined with `", "`.
pub fn link_label(links: &EntityResolutionMap, behavior: &FieldBehavior, row: &Row) -> Option<String> {
    let target = behavior.link_target.as_deref()?;
    if behavior.is_polymorphic() {
        let id = row.text(&behavior.column)?;
        let entity_type = row.text("entity_type").unwrap_or_default();
        return links.polymorphic(&entity_type, &id).map(|e| e.label.clone());
    }
    let labels = links.labels(target, row.value(&behavior.column));
    if labels.is_empty() {
        None
    } else {
        Some(labels.join(", "))
    }
}

/// Key holding the resolved label of `code`.
pub fn label_key(code: &str) -> String {
    format!("{code}_label")
}

const POLYMORPHIC_DETAILS: &[(&str, &str)] = &[
    ("entity_name", "name"),
    ("entity_code", "code"),
    ("entity_status", "status"),
    ("entity_description", "description"),
    ("entity_thumbnail_url", "thumbnail_url"),
];

/// Enriches rows of one entity type.
#[derive(Debug, Clone, Copy)]
pub struct RowEnricher<'a> {
    entity_type: &'a str,
    behaviors: &'a [FieldBehavior],
    links: &'a EntityResolutionMap,
    today: NaiveDate,
}

impl<'a> RowEnricher<'a> {
    pub fn new(
        entity_type: &'a str,
        behaviors: &'a [FieldBehavior],
        links: &'a EntityResolutionMap,
        today: NaiveDate,
    ) -> Self {
        Self {
            entity_type,
            behaviors,
            links,
            today,
        }
    }

    pub fn enrich(&self, row: &Row) -> Row {
        let mut enriched = row.clone();

        for behavior in self.behaviors.iter().filter(|b| b.is_link()) {
            if behavior.is_polymorphic() {
                self.apply_polymorphic(behavior, row, &mut enriched);
                continue;
            }
            if let Some(label) = link_label(self.links, behavior, row) {
                fill(&mut enriched, label_key(&behavior.code), Value::Text(label));
            }
        }

        for (key, value) in computed::compute_all(self.entity_type, &enriched, self.today) {
            fill(&mut enriched, key, value);
        }
        enriched
    }

    pub fn enrich_all(&self, rows: &[Row]) -> Vec<Row> {
        rows.iter().map(|row| self.enrich(row)).collect()
    }

    fn apply_polymorphic(&self, behavior: &FieldBehavior, row: &Row, enriched: &mut Row) {
        let Some(id) = row.text(&behavior.column) else {
            return;
        };
        let entity_type = row.text("entity_type").unwrap_or_default();
        let Some(entity) = self.links.polymorphic(&entity_type, &id) else {
            return;
        };
        for (key, column) in POLYMORPHIC_DETAILS {
            let value = entity.row.text(column).map(Value::Text).unwrap_or_default();
            fill(enriched, key.to_string(), value);
        }
        fill(enriched, "entity_link_label".to_string(), Value::text(entity.label.clone()));
    }
}

/// Set `key` unless the row already holds a non-null value there.
fn fill(row: &mut Row, key: String, value: Value) {
    let slot = row.entry(key).or_default();
    if slot.is_null() {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogBuilder;
    use crate::links::ResolvedEntity;
    use crate::value::row_from_json;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn resolved(label: &str, row: serde_json::Value) -> ResolvedEntity {
        ResolvedEntity {
            label: label.to_string(),
            row: row_from_json(row),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    #[test]
    fn test_enrich_task() {
        let behaviors = CatalogBuilder::new("task").build();
        let mut links = EntityResolutionMap::new();
        links.insert("profile", "u1", resolved("Ana", json!({"id": "u1"})));
        links.insert("profile", "u2", resolved("Ben", json!({"id": "u2"})));
        links.insert(
            "auto",
            "shot:7",
            resolved(
                "SH010 - Opening",
                json!({"id": 7, "code": "SH010", "name": "Opening", "thumbnail_url": "  ", "status": "ip"}),
            ),
        );
        let row = row_from_json(json!({
            "id": 1,
            "assigned_to": "u1",
            "reviewer": ["u1", "u2", "u9"],
            "entity_type": "shot",
            "entity_id": 7,
            "project_id": 3,
            "due_date": "2024-03-12",
            "duration": 4
        }));

        let enriched = RowEnricher::new("task", &behaviors, &links, today()).enrich(&row);

        assert_eq!(enriched["assigned_to"], Value::text("u1"));
        assert_eq!(enriched["assigned_to_label"], Value::text("Ana"));
        assert_eq!(enriched["reviewer_label"], Value::text("Ana, Ben"));
        assert!(!enriched.contains_key("entity_id_label"));
        assert_eq!(enriched["entity_code"], Value::text("SH010"));
        assert_eq!(enriched["entity_status"], Value::text("ip"));
        assert_eq!(enriched["entity_thumbnail_url"], Value::Null);
        assert_eq!(enriched["entity_link_label"], Value::text("SH010 - Opening"));
        assert_eq!(enriched["entity_link_path"], Value::text("/apex/3/shots/7"));
        assert_eq!(enriched["days_remaining"], Value::from(2i64));
        assert_eq!(enriched["duration"], Value::from(4i64));
    }

    #[test]
    fn test_unresolved_links_add_nothing() {
        let behaviors = CatalogBuilder::new("task").build();
        let links = EntityResolutionMap::new();
        let row = row_from_json(json!({"id": 1, "assigned_to": "u1"}));
        let enriched = RowEnricher::new("task", &behaviors, &links, today()).enrich(&row);
        assert!(!enriched.contains_key("assigned_to_label"));
        assert_eq!(enriched["entity_link_label"], Value::text("-"));
    }

    #[test]
    fn test_present_values_are_kept() {
        let behaviors = CatalogBuilder::new("task").build();
        let mut links = EntityResolutionMap::new();
        links.insert("profile", "u1", resolved("Ana", json!({"id": "u1"})));
        links.insert(
            "auto",
            "shot:7",
            resolved("SH010 - Opening", json!({"id": 7, "code": "SH010", "name": "Opening"})),
        );
        let row = row_from_json(json!({
            "id": 1,
            "assigned_to": "u1",
            "assigned_to_label": "Ana (lead)",
            "entity_type": "shot",
            "entity_id": 7,
            "entity_name": "Opening sequence",
            "entity_code": null,
            "entity_link_label": "Shot SH010"
        }));

        let enriched = RowEnricher::new("task", &behaviors, &links, today()).enrich(&row);

        assert_eq!(enriched["assigned_to_label"], Value::text("Ana (lead)"));
        assert_eq!(enriched["entity_name"], Value::text("Opening sequence"));
        assert_eq!(enriched["entity_code"], Value::text("SH010"));
        assert_eq!(enriched["entity_link_label"], Value::text("Shot SH010"));
    }

    #[test]
    fn test_enrich_all_keeps_order() {
        let behaviors = CatalogBuilder::new("shot").build();
        let links = EntityResolutionMap::new();
        let rows = vec![
            row_from_json(json!({"id": 2, "cut_in": 1, "cut_out": 10})),
            row_from_json(json!({"id": 1})),
        ];
        let enriched = RowEnricher::new("shot", &behaviors, &links, today()).enrich_all(&rows);
        assert_eq!(enriched[0]["cut_duration"], Value::Number(10.0));
        assert_eq!(enriched[1]["cut_duration"], Value::Null);
    }
}
