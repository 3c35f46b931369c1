//! Field edits: normalization, optimistic patches and dispatch.

pub mod dispatch;
pub mod normalize;
pub mod prepare;

pub use dispatch::{Dispatcher, MutationHandler, MutationRegistry, StoreMutationHandler, MUTABLE_ENTITY_TYPES};
pub use normalize::{normalize_value, to_utc};
pub use prepare::{FieldEdit, PreparedUpdate, UpdatePreparer};
