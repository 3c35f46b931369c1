//! Subcommands.

use clap::{Args as ClapArgs, Subcommand};

/// Operations on the custom field definition store.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List runtime fields, optionally for one entity type
    ListFields {
        /// Entity type (task, shot, asset, ...)
        #[arg(short, long)]
        entity_type: Option<String>,
    },

    /// List stored field definitions
    Definitions {
        /// Include deactivated definitions
        #[arg(long)]
        include_inactive: bool,
    },

    /// Show the resolved field catalog of an entity type
    Catalog {
        /// Entity type (task, shot, asset, ...)
        entity_type: String,
    },

    /// Create a field and attach it to entity types
    Create(CreateArgs),

    /// Attach an existing field to an entity type
    Attach {
        field_id: i64,
        entity_type: String,
        /// Mark the field required for this entity type
        #[arg(long)]
        required: bool,
        /// Hide the field by default
        #[arg(long)]
        hidden: bool,
        /// Display order
        #[arg(long)]
        order: Option<i64>,
    },

    /// Update field metadata
    Patch {
        field_id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        /// Set the description to null
        #[arg(long)]
        clear_description: bool,
        /// New data type; applied through the data-type change procedure
        #[arg(long)]
        data_type: Option<String>,
    },

    /// Change a field's data type, applying the sync migration when needed
    ChangeType { field_id: i64, data_type: String },

    /// Deactivate a field; stored values are kept
    Deactivate {
        field_id: i64,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Create definitions for physical columns that have none
    Bootstrap {
        /// Limit to one entity type
        #[arg(short, long)]
        entity_type: Option<String>,
    },

    /// List choice sets
    ChoiceSets {
        #[arg(long)]
        include_inactive: bool,
    },

    /// Apply the data-type sync migration script on its own
    ApplyMigration,
}

/// Arguments of `create`.
#[derive(Debug, ClapArgs)]
pub struct CreateArgs {
    /// Display name
    pub name: String,
    /// Field code; becomes the physical column name
    pub code: String,
    /// Entity types to attach to (comma separated or repeated)
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub entities: Vec<String>,
    #[arg(short = 't', long, default_value = "text")]
    pub data_type: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub required: bool,
    /// Choice set backing a list field
    #[arg(long)]
    pub choice_set: Option<i64>,
    /// Entity types an entity field may point to
    #[arg(long, value_delimiter = ',')]
    pub link_targets: Vec<String>,
}
