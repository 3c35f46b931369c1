//! Derived display columns.
//!
//! Each formula reads other cells of the same row. `today` is passed in so
//! date arithmetic is deterministic.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::value::{Row, RowExt, Value};

/// A derived column of one entity type.
#[derive(Clone, Copy)]
pub struct Formula {
    pub code: &'static str,
    /// Columns whose change requires recomputation.
    pub depends_on: &'static [&'static str],
    compute: fn(&Row, NaiveDate) -> Value,
}

impl Formula {
    pub fn evaluate(&self, row: &Row, today: NaiveDate) -> Value {
        (self.compute)(row, today)
    }
}

impl std::fmt::Debug for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formula")
            .field("code", &self.code)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

const fn formula(
    code: &'static str,
    depends_on: &'static [&'static str],
    compute: fn(&Row, NaiveDate) -> Value,
) -> Formula {
    Formula { code, depends_on, compute }
}

const TASK: &[Formula] = &[
    formula("duration", &["start_date", "end_date"], task_duration),
    formula("days_remaining", &["due_date"], days_remaining),
    formula("days_overdue", &["due_date"], days_overdue),
    formula("is_overdue", &["due_date", "status"], is_overdue),
    formula("my_tasks_bucket", &["status"], |row, _| Value::text(my_tasks_bucket(row.value("status")))),
    formula("entity_link_label", &["entity_code", "entity_name"], entity_link_label),
    formula("entity_type_display", &["entity_type"], entity_type_display),
    formula("entity_link_path", &["project_id", "entity_type", "entity_id"], entity_link_path),
];

const SHOT: &[Formula] = &[
    formula("cut_duration", &["cut_in", "cut_out"], |row, _| {
        frames(row, &["cut_in", "cut_out"], |f| f[1] - f[0] + 1.0)
    }),
    formula("head_duration", &["head_in", "cut_in"], |row, _| {
        frames(row, &["head_in", "cut_in"], |f| f[1] - f[0])
    }),
    formula("tail_duration", &["cut_out", "tail_out"], |row, _| {
        frames(row, &["cut_out", "tail_out"], |f| f[1] - f[0])
    }),
    formula("working_duration", &["head_in", "tail_out"], |row, _| {
        frames(row, &["head_in", "tail_out"], |f| f[1] - f[0] + 1.0)
    }),
    formula("frame_summary", &["head_in", "cut_in", "cut_out", "tail_out"], frame_summary),
];

const VERSION: &[Formula] = &[
    formula("frame_count", &["first_frame", "last_frame"], |row, _| {
        frames(row, &["first_frame", "last_frame"], |f| f[1] - f[0] + 1.0)
    }),
    formula("duration_seconds", &["first_frame", "last_frame", "frame_rate"], duration_seconds),
];

/// Formulas registered for `entity_type`.
pub fn formulas(entity_type: &str) -> &'static [Formula] {
    match entity_type {
        "task" => TASK,
        "shot" => SHOT,
        "version" => VERSION,
        _ => &[],
    }
}

pub fn is_computed(entity_type: &str, code: &str) -> bool {
    formulas(entity_type).iter().any(|f| f.code == code)
}

/// Every formula of `entity_type` evaluated against `row`.
pub fn compute_all(entity_type: &str, row: &Row, today: NaiveDate) -> Row {
    formulas(entity_type)
        .iter()
        .map(|f| (f.code.to_string(), f.evaluate(row, today)))
        .collect()
}

/// Formulas depending on `changed`, evaluated against the updated row.
pub fn recalculate(entity_type: &str, row: &Row, changed: &str, today: NaiveDate) -> Row {
    formulas(entity_type)
        .iter()
        .filter(|f| f.depends_on.contains(&changed))
        .map(|f| (f.code.to_string(), f.evaluate(row, today)))
        .collect()
}

/// Calendar date of a cell; date-times are truncated to their date.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = value.non_empty_text()?;
    let date = text.get(..10).unwrap_or(&text);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Weekdays from `start` to `end`, both inclusive.
pub fn working_days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .count() as i64
}

const DONE_KEYWORDS: &[&str] = &[
    "done",
    "complete",
    "completed",
    "approved",
    "final",
    "closed",
    "delivered",
    "published",
    "omit",
    "omitted",
];

const UPCOMING_KEYWORDS: &[&str] = &[
    "pending",
    "todo",
    "to do",
    "not started",
    "ready",
    "waiting",
    "queued",
    "backlog",
    "on hold",
];

const FINAL_STATUSES: &[&str] = &["fin", "final", "done", "complete", "completed", "approved", "delivered"];

/// `active`, `upcoming` or `done` by status keywords.
pub fn my_tasks_bucket(status: &Value) -> &'static str {
    let normalized = status
        .to_text()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if normalized.is_empty() {
        return "active";
    }
    if DONE_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
        return "done";
    }
    if UPCOMING_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
        return "upcoming";
    }
    "active"
}

fn task_duration(row: &Row, _today: NaiveDate) -> Value {
    match (parse_date(row.value("start_date")), parse_date(row.value("end_date"))) {
        (Some(start), Some(end)) => Value::from(working_days_between(start, end)),
        _ => Value::Null,
    }
}

fn days_remaining(row: &Row, today: NaiveDate) -> Value {
    parse_date(row.value("due_date"))
        .map(|due| Value::from((due - today).num_days()))
        .unwrap_or_default()
}

fn days_overdue(row: &Row, today: NaiveDate) -> Value {
    parse_date(row.value("due_date"))
        .map(|due| Value::from((today - due).num_days().max(0)))
        .unwrap_or_default()
}

fn is_overdue(row: &Row, today: NaiveDate) -> Value {
    let Some(due) = parse_date(row.value("due_date")) else {
        return Value::Bool(false);
    };
    if due >= today {
        return Value::Bool(false);
    }
    let status = row.value("status").to_text().trim().to_lowercase();
    Value::Bool(!FINAL_STATUSES.contains(&status.as_str()))
}

fn entity_link_label(row: &Row, _today: NaiveDate) -> Value {
    match (row.text("entity_code"), row.text("entity_name")) {
        (Some(code), Some(name)) => Value::text(format!("{code} - {name}")),
        (Some(label), None) | (None, Some(label)) => Value::text(label),
        (None, None) => Value::text("-"),
    }
}

fn entity_type_display(row: &Row, _today: NaiveDate) -> Value {
    let entity_type = row.value("entity_type").to_text().trim().to_lowercase();
    let mut chars = entity_type.chars();
    match chars.next() {
        Some(first) => Value::text(first.to_uppercase().chain(chars).collect::<String>()),
        None => Value::text("Unknown"),
    }
}

fn entity_link_path(row: &Row, _today: NaiveDate) -> Value {
    let (Some(project), Some(entity)) = (row.text("project_id"), row.text("entity_id")) else {
        return Value::Null;
    };
    let entity_type = row.value("entity_type").to_text().trim().to_lowercase();
    match entity_type.as_str() {
        "asset" => Value::text(format!("/apex/{project}/assets/{entity}")),
        "shot" => Value::text(format!("/apex/{project}/shots/{entity}")),
        "sequence" => Value::text(format!("/apex/{project}/sequences/{entity}")),
        "project" => Value::text(format!("/apex/{project}")),
        _ => Value::Null,
    }
}

fn frames(row: &Row, columns: &[&str], compute: impl Fn(&[f64]) -> f64) -> Value {
    let values: Option<Vec<f64>> = columns.iter().map(|c| row.value(c).as_f64()).collect();
    values.map(|v| Value::Number(compute(&v))).unwrap_or_default()
}

fn frame_summary(row: &Row, _today: NaiveDate) -> Value {
    let values: Option<Vec<f64>> = ["head_in", "cut_in", "cut_out", "tail_out"]
        .iter()
        .map(|c| row.value(c).as_f64())
        .collect();
    let Some([head_in, cut_in, cut_out, tail_out]) = values.as_deref().and_then(|v| <[f64; 4]>::try_from(v).ok())
    else {
        return Value::Null;
    };
    let frames = |n: f64| Value::Number(n).to_text();
    Value::text(format!(
        "Cut: {}f | Head: {}f | Tail: {}f | Working: {}f",
        frames(cut_out - cut_in + 1.0),
        frames(cut_in - head_in),
        frames(tail_out - cut_out),
        frames(tail_out - head_in + 1.0),
    ))
}

fn duration_seconds(row: &Row, _today: NaiveDate) -> Value {
    let first = row.value("first_frame").as_f64();
    let last = row.value("last_frame").as_f64();
    let fps = row.value("frame_rate").as_f64();
    match (first, last, fps) {
        (Some(first), Some(last), Some(fps)) if fps != 0.0 => Value::Number((last - first + 1.0) / fps),
        _ => Value::Null,
    }
}
