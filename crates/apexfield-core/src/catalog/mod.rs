//! Field behavior catalog.

pub mod builder;
pub mod builtin;
pub mod inference;
pub mod types;

pub use builder::{ui_type, CatalogBuilder};
pub use builtin::{entity_table, link_target, AUTO_TARGET, ENTITY_TYPES};
pub use inference::{default_width, infer_data_type};
pub use types::{FieldBehavior, OptionSource, UiType};
