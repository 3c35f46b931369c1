//! End-to-end fetch and edit cycles over an in-memory store.

use std::sync::Arc;

use apexfield_core::store::fixture::install_schema_procedures;
use apexfield_core::value::row_from_json;
use apexfield_core::{
    CoreConfig, DataType, FieldEdit, FieldService, MemoryStore, NewField, Row, RowExt, Value,
};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::json;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
}

fn service(store: Arc<MemoryStore>) -> FieldService {
    FieldService::new(store, CoreConfig::new()).with_today(today())
}

fn task_rows(count: usize, assignees: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            row_from_json(json!({
                "id": i + 1,
                "name": format!("Task {i}"),
                "status": "ip",
                "assigned_to": format!("u{}", i % assignees),
            }))
        })
        .collect()
}

fn profiles(count: usize) -> serde_json::Value {
    serde_json::Value::Array(
        (0..count)
            .map(|i| json!({"id": format!("u{i}"), "display_name": format!("Artist {i}")}))
            .collect(),
    )
}

fn studio() -> MemoryStore {
    MemoryStore::new()
        .with_json_table(
            "statuses",
            json!([
                {"id": 1, "name": "Waiting", "code": "wtg", "sort_order": 1},
                {"id": 2, "name": "In Progress", "code": "ip", "color": "#00f", "sort_order": 2},
                {"id": 3, "name": "Omit", "code": "omt", "sort_order": 3},
                {"id": 4, "name": "Final", "code": "fin", "sort_order": 4}
            ]),
        )
        .with_json_table(
            "status_entity_types",
            json!([
                {"status_id": 1, "entity_type": "task"},
                {"status_id": 2, "entity_type": "all"},
                {"status_id": 3, "entity_type": "shot"}
            ]),
        )
        .with_json_table(
            "steps",
            json!([
                {"id": 10, "name": "Light", "code": "LGT", "department_id": 4, "sort_order": 2},
                {"id": 11, "name": "Precomp", "code": "PRE", "department_id": 4, "sort_order": 1},
                {"id": 12, "name": "Block", "code": "BLK", "department_id": 5, "sort_order": 0}
            ]),
        )
        .with_json_table(
            "departments",
            json!([
                {"id": 4, "name": "Lighting", "code": "LGT"},
                {"id": 5, "name": "Animation", "code": "ANM"}
            ]),
        )
}

#[tokio::test]
async fn test_batch_enrichment_queries_each_target_once() {
    let store = Arc::new(MemoryStore::new().with_json_table("profiles", profiles(12)));
    let service = service(store.clone());
    let rows = task_rows(500, 12);

    let enriched = service.enrich_rows("task", &rows).await.unwrap();

    assert_eq!(store.selects_on("profiles"), 1);
    assert_eq!(enriched.len(), 500);
    assert_eq!(enriched[0].text("assigned_to_label").as_deref(), Some("Artist 0"));
    assert_eq!(enriched[499].text("assigned_to_label").as_deref(), Some("Artist 7"));
    assert!(enriched.iter().all(|row| !row.value("assigned_to_label").is_null()));
}

#[tokio::test]
async fn test_status_options_are_scoped_per_entity() {
    let store = Arc::new(studio());
    let service = service(store);

    let task = service.load_options("task").await.unwrap();
    let shot = service.load_options("shot").await.unwrap();
    let asset = service.load_options("asset").await.unwrap();

    let labels = |options: &[apexfield_core::FieldOption]| -> Vec<String> {
        options.iter().map(|o| o.label.clone()).collect()
    };
    assert_eq!(labels(&task["status"]), vec!["Waiting", "In Progress", "Final"]);
    assert_eq!(labels(&shot["status"]), vec!["In Progress", "Omit", "Final"]);
    assert_eq!(labels(&asset["status"]), vec!["In Progress", "Final"]);
}

#[tokio::test]
async fn test_fetch_view_carries_columns_options_and_labels() {
    let store = Arc::new(studio().with_json_table("profiles", profiles(3)));
    let service = service(store);
    let rows = task_rows(3, 3);

    let view = service
        .fetch("tasks:project-1", "task", rows)
        .await
        .unwrap()
        .into_applied()
        .unwrap();

    assert_eq!(view.entity_type, "task");
    assert_eq!(view.rows[2].text("assigned_to_label").as_deref(), Some("Artist 2"));
    assert!(view.options.contains_key("status"));
    let status = view.columns.iter().find(|c| c.id == "status").unwrap();
    assert!(!status.options.is_empty());
}

#[tokio::test]
async fn test_department_edit_infers_first_step() {
    let store = Arc::new(studio().with_json_table(
        "tasks",
        json!([{"id": 1, "name": "Comp", "status": "ip", "department": null, "step_id": null}]),
    ));
    let service = service(store.clone());
    let row = row_from_json(json!({"id": 1, "name": "Comp", "department": null, "step_id": null}));

    let outcome = service
        .update_field("task", &row, &FieldEdit::new("department", 4i64))
        .await
        .unwrap();

    assert_eq!(outcome.payload["step_id"], Value::Number(11.0));
    assert_eq!(outcome.patch["step_id_label"], Value::text("PRE"));
    assert_eq!(outcome.stored.value("step_id"), &Value::Number(11.0));
    let tasks = store.rows("tasks").unwrap();
    assert_eq!(tasks[0].value("department"), &Value::Number(4.0));
}

#[tokio::test]
async fn test_step_edit_infers_department() {
    let store = Arc::new(studio().with_json_table(
        "tasks",
        json!([{"id": 1, "name": "Comp", "department": null, "step_id": null}]),
    ));
    let service = service(store.clone());
    let row = row_from_json(json!({"id": 1, "department": null, "step_id": null}));

    let outcome = service
        .update_field("task", &row, &FieldEdit::new("step_id", "12"))
        .await
        .unwrap();

    assert_eq!(outcome.payload["department"], Value::Number(5.0));
    assert_eq!(outcome.stored.value("department"), &Value::Number(5.0));
    assert_eq!(store.rows("tasks").unwrap()[0].value("step_id"), &Value::Number(12.0));
}

#[tokio::test]
async fn test_custom_field_is_editable_end_to_end() {
    let memory = studio().with_json_table(
        "tasks",
        json!([{"id": 1, "name": "Comp", "bid_days": null}]),
    );
    install_schema_procedures(&memory);
    let store = Arc::new(memory);
    let service = service(store.clone());
    service
        .definitions()
        .create(
            NewField::new("Bid Days", "bid_days")
                .with_data_type("float")
                .with_entities(["task"]),
        )
        .await
        .unwrap();

    let fields = service.field_definitions("task").await.unwrap();
    let bid = fields.iter().find(|f| f.code == "bid_days").unwrap();
    assert_eq!(bid.data_type, DataType::Float);
    assert!(bid.editable);

    let row = row_from_json(json!({"id": 1, "bid_days": null}));
    let outcome = service
        .update_field("task", &row, &FieldEdit::new("bid_days", " 2.5 "))
        .await
        .unwrap();
    assert_eq!(outcome.stored.value("bid_days"), &Value::Number(2.5));

    let err = service
        .update_field("task", &row, &FieldEdit::new("bid_days", "two"))
        .await
        .unwrap_err();
    assert!(matches!(err, apexfield_core::Error::Validation(_)));
}
