#![forbid(unsafe_code)]

//! Query backends.
//!
//! The cursors and attach helpers only see the [`crate::query::Queryable`] and
//! [`crate::query::QuerySource`] traits. This module provides the in-memory
//! implementation used by the tests, the benchmarks and embedders that want to
//! exercise chunking without a database.

/// In-memory tables with a round-trip log.
pub mod memory;

pub use memory::{FetchKind, FetchRecord, MemoryQuery, MemoryStore};
