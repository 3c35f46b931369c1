//! Apexfield Core - schema discovery, field definitions and row enrichment.
//!
//! Entity tables drift between deployments and gain user-defined columns at
//! runtime. This crate discovers the physical schema at access time and turns
//! raw rows into labeled, option-aware, editable records.

pub mod catalog;
pub mod computed;
pub mod config;
pub mod definition;
pub mod descriptors;
pub mod enrich;
pub mod error;
pub mod events;
pub mod fetch;
pub mod links;
pub mod options;
pub mod schema;
pub mod service;
pub mod store;
pub mod update;
pub mod value;

pub use catalog::{CatalogBuilder, FieldBehavior, OptionSource, UiType};
pub use config::CoreConfig;
pub use definition::{
    AttachOptions, ChoiceSet, ChoiceSetItem, CustomFieldDefinition, DataType, DefinitionStore, FieldPatch,
    FieldType, MigrationApplied, MigrationChain, MigrationError, NewChoiceItem, NewChoiceSet, NewField, RuntimeField,
};
pub use descriptors::{HeaderFieldDescriptor, TableColumnDescriptor};
pub use enrich::RowEnricher;
pub use error::{Error, Result, StoreError};
pub use events::{EventBus, MutationEvent};
pub use fetch::{FetchOutcome, FetchTicket, FetchTracker};
pub use links::{EntityResolutionMap, LinkResolver};
pub use options::{FieldOption, OptionLoader, OptionMap};
pub use schema::{ColumnCandidateSet, TableShape};
pub use service::{EntityView, FieldService, UpdateOutcome};
pub use store::{MemoryStore, RestStore, SharedStore, Store};
pub use update::{Dispatcher, FieldEdit, MutationHandler, MutationRegistry, PreparedUpdate};
pub use value::{Row, RowExt, Value};
