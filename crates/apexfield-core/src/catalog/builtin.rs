//! Compiled field registry.
//!
//! Columns every deployment ships for each entity type, which of them link to
//! another entity, and which are never inline-editable.

/// Link target of a polymorphic `entity_type` + `entity_id` pair.
pub const AUTO_TARGET: &str = "auto";

/// Entity types that can carry custom fields.
pub const ENTITY_TYPES: &[&str] = &[
    "asset",
    "sequence",
    "shot",
    "task",
    "version",
    "note",
    "published_file",
    "project",
    "department",
    "person",
];

/// Columns no caller may write, on any entity type.
pub const SYSTEM_READONLY: &[&str] = &["id", "created_at", "updated_at", "created_by", "updated_by"];

/// Physical table of an entity type.
pub fn entity_table(entity: &str) -> Option<&'static str> {
    Some(match entity {
        "asset" => "assets",
        "sequence" => "sequences",
        "shot" => "shots",
        "task" => "tasks",
        "version" => "versions",
        "note" => "notes",
        "published_file" => "published_files",
        "project" => "projects",
        "department" => "departments",
        "person" => "profiles",
        _ => return None,
    })
}

/// A compiled column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinColumn {
    pub column: &'static str,
    /// Physical type as the store reports it.
    pub pg_type: &'static str,
    pub label: &'static str,
}

const fn col(column: &'static str, pg_type: &'static str, label: &'static str) -> BuiltinColumn {
    BuiltinColumn { column, pg_type, label }
}

const TASK: &[BuiltinColumn] = &[
    col("id", "bigint", "Id"),
    col("thumbnail_url", "text", "Thumbnail"),
    col("name", "text", "Task Name"),
    col("status", "text", "Status"),
    col("department", "bigint", "Department"),
    col("step_id", "bigint", "Pipeline Step"),
    col("assigned_to", "uuid", "Assigned To"),
    col("reviewer", "uuid[]", "Reviewers"),
    col("ayon_assignees", "text[]", "Ayon Assignees"),
    col("cc", "uuid[]", "Cc"),
    col("priority", "text", "Priority"),
    col("start_date", "date", "Start Date"),
    col("due_date", "date", "Due Date"),
    col("end_date", "date", "End Date"),
    col("bid", "numeric", "Bid"),
    col("description", "text", "Description"),
    col("tags", "text[]", "Tags"),
    col("entity_type", "text", "Link Type"),
    col("entity_id", "bigint", "Link"),
    col("project_id", "bigint", "Project"),
    col("client_approved_by", "uuid", "Client Approved By"),
    col("cached_display_name", "text", "Display Name"),
    col("created_by", "uuid", "Created By"),
    col("updated_by", "uuid", "Updated By"),
    col("created_at", "timestamptz", "Date Created"),
    col("updated_at", "timestamptz", "Date Updated"),
];

const SHOT: &[BuiltinColumn] = &[
    col("id", "bigint", "Id"),
    col("thumbnail_url", "text", "Thumbnail"),
    col("code", "text", "Shot Code"),
    col("name", "text", "Name"),
    col("status", "text", "Status"),
    col("sequence_id", "bigint", "Sequence"),
    col("description", "text", "Description"),
    col("head_in", "integer", "Head In"),
    col("cut_in", "integer", "Cut In"),
    col("cut_out", "integer", "Cut Out"),
    col("tail_out", "integer", "Tail Out"),
    col("cut_duration", "integer", "Cut Duration"),
    col("assigned_to", "uuid", "Assigned To"),
    col("tags", "text[]", "Tags"),
    col("project_id", "bigint", "Project"),
    col("created_by", "uuid", "Created By"),
    col("updated_by", "uuid", "Updated By"),
    col("created_at", "timestamptz", "Date Created"),
    col("updated_at", "timestamptz", "Date Updated"),
];

const ASSET: &[BuiltinColumn] = &[
    col("id", "bigint", "Id"),
    col("thumbnail_url", "text", "Thumbnail"),
    col("code", "text", "Asset Code"),
    col("name", "text", "Asset Name"),
    col("asset_type", "text", "Type"),
    col("status", "text", "Status"),
    col("description", "text", "Description"),
    col("sequence_id", "bigint", "Sequence"),
    col("shot_id", "bigint", "Shot"),
    col("assigned_to", "uuid", "Assigned To"),
    col("tags", "text[]", "Tags"),
    col("project_id", "bigint", "Project"),
    col("created_by", "uuid", "Created By"),
    col("updated_by", "uuid", "Updated By"),
    col("created_at", "timestamptz", "Date Created"),
    col("updated_at", "timestamptz", "Date Updated"),
];

const SEQUENCE: &[BuiltinColumn] = &[
    col("id", "bigint", "Id"),
    col("thumbnail_url", "text", "Thumbnail"),
    col("code", "text", "Sequence Code"),
    col("name", "text", "Name"),
    col("status", "text", "Status"),
    col("description", "text", "Description"),
    col("tags", "text[]", "Tags"),
    col("project_id", "bigint", "Project"),
    col("created_by", "uuid", "Created By"),
    col("updated_by", "uuid", "Updated By"),
    col("created_at", "timestamptz", "Date Created"),
    col("updated_at", "timestamptz", "Date Updated"),
];

const VERSION: &[BuiltinColumn] = &[
    col("id", "bigint", "Id"),
    col("thumbnail_url", "text", "Thumbnail"),
    col("code", "text", "Version Name"),
    col("version_number", "integer", "Version"),
    col("status", "text", "Status"),
    col("description", "text", "Description"),
    col("entity_type", "text", "Link Type"),
    col("entity_id", "bigint", "Link"),
    col("task_id", "bigint", "Task"),
    col("artist_id", "uuid", "Artist"),
    col("department", "bigint", "Department"),
    col("first_frame", "integer", "First Frame"),
    col("last_frame", "integer", "Last Frame"),
    col("frame_rate", "numeric", "Frame Rate"),
    col("movie_url", "text", "Movie"),
    col("project_id", "bigint", "Project"),
    col("created_by", "uuid", "Created By"),
    col("updated_by", "uuid", "Updated By"),
    col("created_at", "timestamptz", "Date Created"),
    col("updated_at", "timestamptz", "Date Updated"),
];

const NOTE: &[BuiltinColumn] = &[
    col("id", "bigint", "Id"),
    col("subject", "text", "Subject"),
    col("body", "text", "Body"),
    col("status", "text", "Status"),
    col("entity_type", "text", "Link Type"),
    col("entity_id", "bigint", "Link"),
    col("task_id", "bigint", "Task"),
    col("author_id", "uuid", "Author"),
    col("project_id", "bigint", "Project"),
    col("created_by", "uuid", "Created By"),
    col("created_at", "timestamptz", "Date Created"),
    col("updated_at", "timestamptz", "Date Updated"),
];

const PUBLISHED_FILE: &[BuiltinColumn] = &[
    col("id", "bigint", "Id"),
    col("code", "text", "Name"),
    col("file_type", "text", "File Type"),
    col("status", "text", "Status"),
    col("description", "text", "Description"),
    col("path", "text", "Path"),
    col("entity_type", "text", "Link Type"),
    col("entity_id", "bigint", "Link"),
    col("task_id", "bigint", "Task"),
    col("version_id", "bigint", "Version"),
    col("published_by", "uuid", "Published By"),
    col("project_id", "bigint", "Project"),
    col("created_by", "uuid", "Created By"),
    col("created_at", "timestamptz", "Date Created"),
    col("updated_at", "timestamptz", "Date Updated"),
];

const PROJECT: &[BuiltinColumn] = &[
    col("id", "bigint", "Id"),
    col("thumbnail_url", "text", "Thumbnail"),
    col("name", "text", "Project Name"),
    col("code", "text", "Code"),
    col("status", "text", "Status"),
    col("description", "text", "Description"),
    col("start_date", "date", "Start Date"),
    col("end_date", "date", "End Date"),
    col("created_at", "timestamptz", "Date Created"),
    col("updated_at", "timestamptz", "Date Updated"),
];

/// Compiled columns of `entity`, in display order.
pub fn builtin_columns(entity: &str) -> &'static [BuiltinColumn] {
    match entity {
        "task" => TASK,
        "shot" => SHOT,
        "asset" => ASSET,
        "sequence" => SEQUENCE,
        "version" => VERSION,
        "note" => NOTE,
        "published_file" => PUBLISHED_FILE,
        "project" => PROJECT,
        _ => &[],
    }
}

/// Link-holding columns per entity type.
pub fn link_fields(entity: &str) -> &'static [(&'static str, &'static str)] {
    match entity {
        "task" => &[
            ("assigned_to", "profile"),
            ("reviewer", "profile"),
            ("ayon_assignees", "profile"),
            ("cc", "profile"),
            ("created_by", "profile"),
            ("updated_by", "profile"),
            ("client_approved_by", "profile"),
            ("step_id", "pipeline_step"),
            ("department", "department"),
            ("project_id", "project"),
            ("entity_id", AUTO_TARGET),
        ],
        "shot" => &[
            ("sequence_id", "sequence"),
            ("created_by", "profile"),
            ("updated_by", "profile"),
            ("project_id", "project"),
            ("assigned_to", "profile"),
        ],
        "asset" => &[
            ("sequence_id", "sequence"),
            ("shot_id", "shot"),
            ("created_by", "profile"),
            ("updated_by", "profile"),
            ("project_id", "project"),
            ("assigned_to", "profile"),
        ],
        "sequence" => &[
            ("created_by", "profile"),
            ("updated_by", "profile"),
            ("project_id", "project"),
        ],
        "version" => &[
            ("artist_id", "profile"),
            ("created_by", "profile"),
            ("updated_by", "profile"),
            ("project_id", "project"),
            ("task_id", "task"),
            ("entity_id", AUTO_TARGET),
            ("department", "department"),
        ],
        "note" => &[
            ("author_id", "profile"),
            ("created_by", "profile"),
            ("entity_id", AUTO_TARGET),
            ("task_id", "task"),
            ("project_id", "project"),
        ],
        "published_file" => &[
            ("published_by", "profile"),
            ("created_by", "profile"),
            ("project_id", "project"),
            ("task_id", "task"),
            ("version_id", "version"),
            ("entity_id", AUTO_TARGET),
        ],
        _ => &[],
    }
}

/// Link target of `column` on `entity`.
pub fn link_target(entity: &str, column: &str) -> Option<&'static str> {
    link_fields(entity)
        .iter()
        .find(|(c, _)| *c == column)
        .map(|(_, target)| *target)
}

/// Columns shown when a view has no saved layout.
pub fn default_visible(entity: &str) -> &'static [&'static str] {
    match entity {
        "task" => &[
            "thumbnail_url",
            "name",
            "status",
            "department",
            "assigned_to",
            "priority",
            "start_date",
            "due_date",
            "end_date",
        ],
        "shot" => &[
            "thumbnail_url",
            "code",
            "name",
            "status",
            "sequence_id",
            "cut_in",
            "cut_out",
            "cut_duration",
            "tags",
        ],
        "asset" => &["thumbnail_url", "code", "name", "asset_type", "status", "tags"],
        "sequence" => &["thumbnail_url", "name", "status", "tags"],
        "version" => &["thumbnail_url", "code", "status", "entity_type", "description", "created_at"],
        "note" => &["subject", "body", "entity_type", "created_by", "created_at"],
        "published_file" => &["code", "file_type", "status", "entity_type", "created_at"],
        _ => &[],
    }
}

/// Columns that shape an entity's identity and never change inline.
pub fn structural_deny(entity: &str) -> &'static [&'static str] {
    match entity {
        "task" => &["entity_type", "entity_id", "project_id", "cached_display_name"],
        "shot" | "asset" | "sequence" => &["project_id"],
        "version" | "note" => &["entity_type", "entity_id", "project_id"],
        "published_file" => &["entity_type", "entity_id", "project_id", "version_id"],
        _ => &[],
    }
}
