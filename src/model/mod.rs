#![forbid(unsafe_code)]

//! Rows, scalar values and model metadata shared by the cursor engine and
//! the relation helpers.

/// Materialized rows and their relation cache slots.
pub mod entity;

/// Primary-key descriptors and relation fields.
pub mod meta;

/// Scalar field values and lookup keys.
pub mod value;

pub use entity::Entity;
pub use meta::{KeyKind, ModelMeta, PrimaryKey, RelationField, RelationKind, ResolvedRelation};
pub use value::{Key, Value};
