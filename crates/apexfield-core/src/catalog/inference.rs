//! Data type inference for columns without a stored definition.

use crate::definition::DataType;

/// Infer a data type from a column name, falling back to its physical type.
pub fn infer_data_type(column: &str, pg_type: &str) -> DataType {
    let column = column.trim().to_lowercase();
    let c = column.as_str();

    if c == "status" {
        return DataType::StatusList;
    }
    if c == "tags" || c.ends_with("_tags") {
        return DataType::TagList;
    }
    if c == "thumbnail_url" || c == "filmstrip_thumbnail_url" {
        return DataType::Image;
    }
    if c.ends_with("_url") || c == "link" {
        return DataType::Url;
    }
    if c.ends_with("_at") {
        return DataType::DateTime;
    }
    if c.ends_with("_date") {
        return DataType::Date;
    }
    if matches!(c, "description" | "body" | "notes") {
        return DataType::TextArea;
    }
    if c == "color" || c.ends_with("_color") {
        return DataType::Color;
    }

    from_pg_type(pg_type)
}

/// Physical type to data type.
pub fn from_pg_type(pg_type: &str) -> DataType {
    let pg = pg_type.trim().to_lowercase();
    if pg.ends_with("[]") {
        return DataType::TagList;
    }
    match pg.as_str() {
        "date" => DataType::Date,
        "time" | "interval" => DataType::Duration,
        "money" => DataType::Currency,
        "uuid" | "character varying" | "varchar" | "char" => DataType::Text,
        _ => DataType::from_lenient(&pg),
    }
}

/// Link fields: arrays hold several ids.
pub fn link_data_type(pg_type: &str) -> DataType {
    if pg_type.trim().ends_with("[]") {
        DataType::MultiEntity
    } else {
        DataType::Entity
    }
}

/// Default column width in pixels.
pub fn default_width(data_type: DataType) -> u32 {
    match data_type {
        DataType::Text => 180,
        DataType::TextArea => 260,
        DataType::Number => 100,
        DataType::Float => 120,
        DataType::Checkbox => 80,
        DataType::Date => 140,
        DataType::DateTime => 180,
        DataType::Duration => 120,
        DataType::Percent => 100,
        DataType::Currency => 120,
        DataType::Timecode => 120,
        DataType::List => 150,
        DataType::StatusList => 140,
        DataType::Entity => 180,
        DataType::MultiEntity => 220,
        DataType::TagList => 200,
        DataType::Image => 88,
        DataType::Url => 200,
        DataType::Color => 100,
        DataType::Serializable => 200,
        DataType::Calculated | DataType::Query | DataType::Summary => 140,
        _ => 150,
    }
}
