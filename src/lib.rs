//! Chunked iteration and bulk relation loading for large relational result sets.
//!
//! The crate works against any backend that implements
//! [`query::QuerySource`] and [`query::Queryable`]:
//!
//! - [`query::RangeCursorWrapper`] walks a table by primary-key ranges instead
//!   of OFFSET pages, optionally attaching relations and running callbacks per
//!   chunk.
//! - [`query::RangeQuerySet`] makes that chunking transparent for streaming.
//! - [`query::SkinnyCursor`] is a single-pass cursor that never buffers.
//! - [`relation::attach_foreign_key`] and [`relation::attach_foreign_keys`]
//!   eager-load related rows with one keyed fetch.
//!
//! [`backend::MemoryStore`] is an in-memory backend for tests and embedding.

#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod helpers;
pub mod model;
pub mod query;
pub mod relation;

pub use backend::MemoryStore;
pub use error::{DbUtilsError, Result};
pub use helpers::{distinct, RelatedEntitySet};
pub use model::{Entity, Key, ModelMeta, PrimaryKey, RelationField, Value};
pub use query::{
    CursorConfig, CursorOptions, OffsetPager, QuerySource, Queryable, RangeCursorWrapper,
    RangeQuerySet, SkinnyCursor,
};
pub use relation::{attach_foreign_key, attach_foreign_keys};
