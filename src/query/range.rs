//! Primary-key range scanning.
//!
//! Instead of OFFSET/LIMIT, which makes the store skip and discard every row
//! before the page, the scanner walks the key space in inclusive windows:
//!
//! ```text
//! key BETWEEN at AND min(at + step - 1, max_id)      -- ascending
//! key BETWEEN max(at - step + 1, min_id) AND at      -- descending
//! ```
//!
//! Each window is one round trip. The next window starts one unit past the
//! previous one, so a boundary row is neither repeated nor skipped. When a
//! window comes back empty the scanner re-seeks with a MIN/MAX aggregate over
//! the remaining range, jumping straight over gaps in the key space.

use std::fmt;
use std::sync::Arc;
use std::vec;

use tracing::{debug, trace};

use crate::error::{DbUtilsError, Result};
use crate::model::{Entity, Value};
use crate::query::offset::OffsetPager;
use crate::query::options::CursorOptions;
use crate::query::profile::{
    profile_timer, record_profile_timer, record_rows_yielded, CursorProfileKind,
};
use crate::query::{OrderBy, Predicate, Queryable};
use crate::relation::attach_foreign_key;

/// Side-effect invoked with every fetched chunk before its rows are yielded.
pub type ChunkCallback = Arc<dyn Fn(&mut [Entity]) + Send + Sync>;

/// Post-fetch processing shared by both chunking strategies.
#[derive(Clone, Default)]
pub(crate) struct Enrichment {
    select_related: Vec<String>,
    callbacks: Vec<ChunkCallback>,
}

impl Enrichment {
    pub(crate) fn apply<Q: Queryable>(&self, query: &Q, rows: &mut [Entity]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        for name in &self.select_related {
            let (relation, nested) = match name.split_once('.') {
                Some((relation, rest)) => (relation, vec![rest.to_string()]),
                None => (name.as_str(), Vec::new()),
            };
            let field = query.model().relation(relation)?;
            attach_foreign_key(query.source(), rows, field, &nested, query.database())?;
        }
        for callback in &self.callbacks {
            let timer = profile_timer();
            callback(rows);
            record_profile_timer(CursorProfileKind::Callback, timer);
        }
        Ok(())
    }
}

impl fmt::Debug for Enrichment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enrichment")
            .field("select_related", &self.select_related)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Iterates a queryable in chunks of `step` keys using primary-key range
/// predicates.
///
/// The queryable must not carry an offset or an explicit ordering; a pending
/// high mark becomes the row limit. ORDER BY clauses cannot be honored by this
/// strategy. Models whose primary key is not an integer fall back to
/// [`OffsetPager`].
///
/// ```ignore
/// let rows = RangeCursorWrapper::new(store.objects("post", "primary")?, CursorOptions::default().step(500))?
///     .callback(|chunk| println!("{} rows", chunk.len()));
/// for row in rows {
///     let row = row?;
/// }
/// ```
#[derive(Debug)]
pub struct RangeCursorWrapper<Q> {
    query: Q,
    step: i64,
    desc: bool,
    limit: Option<usize>,
    min_id: Option<i64>,
    max_id: Option<i64>,
    sorted: bool,
    enrich: Enrichment,
}

impl<Q: Queryable> RangeCursorWrapper<Q> {
    /// Validates the queryable and takes over its slice marks.
    pub fn new(mut query: Q, options: CursorOptions) -> Result<Self> {
        let marks = query.marks();
        if marks.low != 0 {
            return Err(DbUtilsError::InvalidQueryable(
                "range scanning requires a zero offset",
            ));
        }
        if query.is_ordered() {
            return Err(DbUtilsError::InvalidQueryable(
                "range scanning cannot honor an explicit ordering",
            ));
        }
        if options.step == 0 {
            return Err(DbUtilsError::UnsupportedOperation("step must be non-zero"));
        }
        let limit = options.limit.or(marks.high);
        query.clear_limits();

        let sorted = options.effective_sorted();
        let mut step = options.step.unsigned_abs().min(i64::MAX as u64) as i64;
        if let Some(limit) = limit {
            step = step.min(limit.max(1).min(i64::MAX as usize) as i64);
        }
        Ok(Self {
            query,
            step,
            desc: options.step < 0,
            limit,
            min_id: options.min_id,
            max_id: options.max_id,
            sorted,
            enrich: Enrichment {
                select_related: options.select_related,
                callbacks: Vec::new(),
            },
        })
    }

    /// Registers a per-chunk callback. Callbacks run in registration order.
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut [Entity]) + Send + Sync + 'static,
    {
        self.enrich.callbacks.push(Arc::new(callback));
        self
    }

    /// Registers several shared callbacks.
    pub fn with_callbacks(mut self, callbacks: impl IntoIterator<Item = ChunkCallback>) -> Self {
        self.enrich.callbacks.extend(callbacks);
        self
    }

    /// Effective chunk size after clamping to the limit.
    pub fn step(&self) -> i64 {
        self.step
    }

    /// Effective row limit.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl<Q: Queryable> IntoIterator for RangeCursorWrapper<Q> {
    type Item = Result<Entity>;
    type IntoIter = RangeScan<Q>;

    fn into_iter(self) -> Self::IntoIter {
        if !self.query.model().pk.kind.is_integer() {
            debug!(
                model = %self.query.model().name,
                "non-integer primary key; falling back to offset paging"
            );
            let pager = OffsetPager::new(self.query, self.step as usize, self.limit)
                .with_enrichment(self.enrich);
            return RangeScan::Offset(pager);
        }
        RangeScan::Keys(KeyRangeScan::new(self))
    }
}

/// Lazy, finite, non-restartable row sequence produced by [`RangeCursorWrapper`].
pub enum RangeScan<Q> {
    /// Offset paging fallback for non-integer keys.
    Offset(OffsetPager<Q>),
    /// Primary-key range walk.
    Keys(KeyRangeScan<Q>),
}

impl<Q: Queryable> Iterator for RangeScan<Q> {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RangeScan::Offset(pager) => pager.next(),
            RangeScan::Keys(scan) => scan.next(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum WalkState {
    Pending,
    Walking { at: i64, min_id: i64, max_id: i64 },
    Done,
}

/// Walk state of a primary-key range scan.
pub struct KeyRangeScan<Q> {
    query: Q,
    pk: String,
    step: i64,
    desc: bool,
    limit: Option<usize>,
    min_id: Option<i64>,
    max_id: Option<i64>,
    sorted: bool,
    enrich: Enrichment,
    state: WalkState,
    chunk: vec::IntoIter<Entity>,
    num: usize,
}

impl<Q: Queryable> KeyRangeScan<Q> {
    fn new(wrapper: RangeCursorWrapper<Q>) -> Self {
        let pk = wrapper.query.model().pk.field.clone();
        let state = if wrapper.limit == Some(0) {
            WalkState::Done
        } else {
            WalkState::Pending
        };
        Self {
            query: wrapper.query,
            pk,
            step: wrapper.step,
            desc: wrapper.desc,
            limit: wrapper.limit,
            min_id: wrapper.min_id,
            max_id: wrapper.max_id,
            sorted: wrapper.sorted,
            enrich: wrapper.enrich,
            state,
            chunk: Vec::new().into_iter(),
            num: 0,
        }
    }

    /// Rows fetched so far.
    pub fn fetched(&self) -> usize {
        self.num
    }

    fn remaining(&self) -> Option<usize> {
        self.limit.map(|limit| limit.saturating_sub(self.num))
    }

    fn bootstrap(&self) -> Result<Option<(i64, i64)>> {
        let (min_id, max_id) = match (self.min_id, self.max_id) {
            (Some(min_id), Some(max_id)) => (min_id, max_id),
            (requested_min, requested_max) => {
                let timer = profile_timer();
                let bounds = self.query.min_max(&self.pk)?;
                record_profile_timer(CursorProfileKind::Bounds, timer);
                let Some((low, high)) = bounds else {
                    return Ok(None);
                };
                let (low, high) = int_bounds(&low, &high)?;
                (requested_min.unwrap_or(low), requested_max.unwrap_or(high))
            }
        };
        debug!(
            model = %self.query.model().name,
            min_id,
            max_id,
            step = self.step,
            desc = self.desc,
            "range scan bounds"
        );
        if min_id > max_id {
            return Ok(None);
        }
        Ok(Some((min_id, max_id)))
    }

    /// Finds the first key at or past `from` in walking direction.
    fn reseek(&self, from: i64, min_id: i64, max_id: i64) -> Result<Option<i64>> {
        let range = if self.desc {
            Predicate::between(self.pk.as_str(), min_id, from)
        } else {
            Predicate::between(self.pk.as_str(), from, max_id)
        };
        let timer = profile_timer();
        let bounds = self.query.filter(range).min_max(&self.pk)?;
        record_profile_timer(CursorProfileKind::Bounds, timer);
        let Some((low, high)) = bounds else {
            return Ok(None);
        };
        let (low, high) = int_bounds(&low, &high)?;
        Ok(Some(if self.desc { high } else { low }))
    }

    /// Loads the next non-empty chunk. Returns false once the walk is over.
    fn advance(&mut self) -> Result<bool> {
        if self.remaining() == Some(0) {
            return Ok(false);
        }
        let (mut at, min_id, max_id) = match self.state {
            WalkState::Done => return Ok(false),
            WalkState::Walking { at, min_id, max_id } => (at, min_id, max_id),
            WalkState::Pending => match self.bootstrap()? {
                Some((min_id, max_id)) => {
                    let at = if self.desc { max_id } else { min_id };
                    (at, min_id, max_id)
                }
                None => return Ok(false),
            },
        };

        loop {
            if at < min_id || at > max_id {
                return Ok(false);
            }
            let (low, high) = if self.desc {
                (at.saturating_sub(self.step - 1).max(min_id), at)
            } else {
                (at, at.saturating_add(self.step - 1).min(max_id))
            };
            let exhausted = if self.desc { low <= min_id } else { high >= max_id };
            let next_at = if self.desc {
                low.saturating_sub(1)
            } else {
                high.saturating_add(1)
            };

            let mut rows = self.fetch_window(low, high)?;
            trace!(low, high, rows = rows.len(), "range chunk");

            if rows.is_empty() {
                if exhausted {
                    return Ok(false);
                }
                match self.reseek(next_at, min_id, max_id)? {
                    Some(found) => {
                        at = found;
                        continue;
                    }
                    None => return Ok(false),
                }
            }

            self.state = if exhausted {
                WalkState::Done
            } else {
                WalkState::Walking {
                    at: next_at,
                    min_id,
                    max_id,
                }
            };
            self.enrich.apply(&self.query, &mut rows)?;
            self.num += rows.len();
            record_rows_yielded(rows.len() as u64);
            self.chunk = rows.into_iter();
            return Ok(true);
        }
    }

    fn fetch_window(&self, low: i64, high: i64) -> Result<Vec<Entity>> {
        let mut query = self
            .query
            .filter(Predicate::between(self.pk.as_str(), low, high));
        if self.sorted {
            query = query.order_by(if self.desc {
                OrderBy::desc(self.pk.as_str())
            } else {
                OrderBy::asc(self.pk.as_str())
            });
        }
        if let Some(remaining) = self.remaining() {
            if (remaining as u64) < self.step as u64 {
                query = query.slice(0, Some(remaining));
            }
        }
        let timer = profile_timer();
        let rows = query.execute()?;
        record_profile_timer(CursorProfileKind::ChunkFetch, timer);
        Ok(rows)
    }
}

impl<Q: Queryable> Iterator for KeyRangeScan<Q> {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.chunk.next() {
                return Some(Ok(row));
            }
            match self.advance() {
                Ok(true) => continue,
                Ok(false) => {
                    self.state = WalkState::Done;
                    return None;
                }
                Err(err) => {
                    self.state = WalkState::Done;
                    return Some(Err(err));
                }
            }
        }
    }
}

fn int_bounds(low: &Value, high: &Value) -> Result<(i64, i64)> {
    match (low.as_int(), high.as_int()) {
        (Some(low), Some(high)) => Ok((low, high)),
        _ => Err(DbUtilsError::Backend(format!(
            "primary key bounds are not integers ({low:?}, {high:?})"
        ))),
    }
}
