//! Custom field and choice-set definitions.

pub mod migration;
pub mod store;
pub mod types;

pub use migration::{
    AdminApiStrategy, ExecSqlStrategy, MigrationApplied, MigrationChain, MigrationError, MigrationStrategy, StrategyFailure,
    UnavailableStrategy,
};
pub use store::DefinitionStore;
pub use types::{
    AttachOptions, ChoiceSet, ChoiceSetItem, CustomFieldDefinition, DataType, FieldPatch, FieldType,
    NewChoiceItem, NewChoiceSet, NewField, Patch, RuntimeField,
};
