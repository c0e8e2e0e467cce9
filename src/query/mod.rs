#![forbid(unsafe_code)]

//! Chunked iteration over large result sets.
//!
//! This module holds the queryable contracts plus the three ways of walking a
//! result set without loading it whole: key-range scans, offset paging and
//! skinny single-pass cursors.

/// Contracts consumed from the backing model layer.
///
/// Predicates, orderings, slice marks and the `Queryable`/`QuerySource` traits.
pub mod queryable;

/// LIMIT/OFFSET paging.
pub mod offset;

/// Cursor options and configuration profiles.
pub mod options;

/// Primary-key range scanning.
///
/// Walks the key space in BETWEEN windows and re-seeks over gaps.
pub mod range;

/// Queryable wrapper that chunks streaming iteration transparently.
pub mod range_queryset;

/// Single-pass cursors.
pub mod skinny;

/// Performance profiling for chunked iteration.
///
/// Collects timing and count statistics to identify performance bottlenecks.
pub mod profile;

pub use offset::{OffsetPager, DEFAULT_OFFSET_STEP};
pub use options::{ConfigError, CursorConfig, CursorOptions, DEFAULT_RANGE_STEP};
pub use queryable::{CmpOp, OrderBy, Predicate, QuerySource, Queryable, RowStream, SliceMarks};
pub use range::{ChunkCallback, KeyRangeScan, RangeCursorWrapper, RangeScan};
pub use range_queryset::RangeQuerySet;
pub use skinny::{SkinnyCursor, SkinnyIter};
