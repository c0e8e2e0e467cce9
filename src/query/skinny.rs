use std::vec;

use tracing::trace;

use crate::error::{DbUtilsError, Result};
use crate::model::Entity;
use crate::query::{QuerySource, Queryable, RowStream};

/// Single-pass row cursor that never buffers while iterating.
///
/// A plain result set keeps every row it has produced so it can be iterated
/// again. A skinny cursor hands out rows from [`Queryable::stream`] without
/// keeping them and refuses a second pass; how lazily rows arrive is up to
/// the queryable's stream. [`SkinnyCursor::len`] and [`SkinnyCursor::to_list`]
/// opt back into buffering; once the buffer exists it serves every later
/// iteration.
#[derive(Debug)]
pub struct SkinnyCursor<Q> {
    query: Q,
    has_run: bool,
    result_cache: Option<Vec<Entity>>,
}

impl<Q: Queryable> SkinnyCursor<Q> {
    /// Wraps a pending query.
    pub fn new(query: Q) -> Self {
        Self {
            query,
            has_run: false,
            result_cache: None,
        }
    }

    /// Skinny cursor over every row of `model` on `database`.
    pub fn objects<S>(source: &S, model: &str, database: &str) -> Result<Self>
    where
        S: QuerySource<Query = Q>,
    {
        Ok(Self::new(source.objects(model, database)?))
    }

    /// Underlying query.
    pub fn query(&self) -> &Q {
        &self.query
    }

    /// Whether a streaming pass has started.
    pub fn has_run(&self) -> bool {
        self.has_run
    }

    /// Materializes the result and returns its length.
    ///
    /// Fails once a streaming pass has started; use [`SkinnyCursor::count`]
    /// or [`SkinnyCursor::to_list`] instead.
    pub fn len(&mut self) -> Result<usize> {
        if self.has_run && self.result_cache.is_none() {
            return Err(DbUtilsError::UnsupportedOperation(
                "len() after iteration; use count() or to_list()",
            ));
        }
        Ok(self.fill_cache()?.len())
    }

    /// Materializes the result and reports whether it is empty.
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Row count without buffering the rows.
    pub fn count(&self) -> Result<usize> {
        match &self.result_cache {
            Some(rows) => Ok(rows.len()),
            None => self.query.count(),
        }
    }

    /// Starts the single streaming pass, or replays the buffer if one exists.
    pub fn iter(&mut self) -> Result<SkinnyIter> {
        if let Some(rows) = &self.result_cache {
            return Ok(SkinnyIter::Buffered(rows.clone().into_iter()));
        }
        if self.has_run {
            return Err(DbUtilsError::DoubleIteration);
        }
        self.has_run = true;
        trace!(model = %self.query.model().name, "skinny cursor streaming");
        Ok(SkinnyIter::Streaming(self.query.stream()?))
    }

    /// Buffers every row and returns a copy of the buffer.
    pub fn to_list(&mut self) -> Result<Vec<Entity>> {
        if self.has_run && self.result_cache.is_none() {
            return Err(DbUtilsError::DoubleIteration);
        }
        Ok(self.fill_cache()?.clone())
    }

    fn fill_cache(&mut self) -> Result<&Vec<Entity>> {
        if self.result_cache.is_none() {
            let rows = self.query.stream()?.collect::<Result<Vec<_>>>()?;
            self.result_cache = Some(rows);
        }
        Ok(self.result_cache.get_or_insert_with(Vec::new))
    }
}

/// Rows produced by [`SkinnyCursor::iter`].
pub enum SkinnyIter {
    /// Replay of the materialized buffer.
    Buffered(vec::IntoIter<Entity>),
    /// The single unbuffered pass.
    Streaming(RowStream),
}

impl Iterator for SkinnyIter {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SkinnyIter::Buffered(rows) => rows.next().map(Ok),
            SkinnyIter::Streaming(rows) => rows.next(),
        }
    }
}
