use std::vec;

use tracing::trace;

use crate::error::Result;
use crate::model::Entity;
use crate::query::profile::{
    profile_timer, record_profile_timer, record_rows_yielded, CursorProfileKind,
};
use crate::query::range::Enrichment;
use crate::query::Queryable;

/// Default page size for offset paging.
pub const DEFAULT_OFFSET_STEP: usize = 10_000;

/// Iterates through a queryable using LIMIT/OFFSET pages.
///
/// Every page re-scans the skipped rows on the store side, so prefer
/// [`super::RangeCursorWrapper`] whenever the primary key is an integer. This
/// pager is the fallback for other key types and for queries that already
/// carry an ordering or a slice.
pub struct OffsetPager<Q> {
    query: Q,
    step: usize,
    limit: Option<usize>,
    at: usize,
    page: vec::IntoIter<Entity>,
    done: bool,
    enrich: Enrichment,
}

impl<Q: Queryable> OffsetPager<Q> {
    /// Creates a pager; `step` is clamped to `limit` when one is given.
    pub fn new(query: Q, step: usize, limit: Option<usize>) -> Self {
        let step = match limit {
            Some(limit) => step.min(limit),
            None => step,
        };
        Self {
            query,
            step: step.max(1),
            limit,
            at: 0,
            page: Vec::new().into_iter(),
            done: limit == Some(0),
            enrich: Enrichment::default(),
        }
    }

    pub(crate) fn with_enrichment(mut self, enrich: Enrichment) -> Self {
        self.enrich = enrich;
        self
    }

    fn fetch_page(&mut self) -> Result<()> {
        let mut high = self.at.saturating_add(self.step);
        if let Some(limit) = self.limit {
            high = high.min(limit);
        }
        let requested = high - self.at;
        let timer = profile_timer();
        let mut rows = self.query.slice(self.at, Some(high)).execute()?;
        record_profile_timer(CursorProfileKind::ChunkFetch, timer);
        trace!(at = self.at, requested, rows = rows.len(), "offset page");

        self.at = high;
        if rows.len() < requested || self.limit.is_some_and(|limit| self.at >= limit) {
            self.done = true;
        }
        self.enrich.apply(&self.query, &mut rows)?;
        record_rows_yielded(rows.len() as u64);
        self.page = rows.into_iter();
        Ok(())
    }
}

impl<Q: Queryable> Iterator for OffsetPager<Q> {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.page.next() {
                return Some(Ok(row));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.done = true;
                return Some(Err(err));
            }
        }
    }
}
