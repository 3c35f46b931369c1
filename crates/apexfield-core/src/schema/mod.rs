//! Runtime schema discovery and semantic column resolution.

pub mod candidates;
pub mod discovery;
pub mod resolver;

pub use candidates::LogicalTable;
pub use discovery::{
    describe, discover_columns, map_semantic_input, pick_writable_columns, resolve_table,
    ColumnSource, TableShape,
};
pub use resolver::{resolve_column, ColumnCandidateSet, ResolvedColumns};
