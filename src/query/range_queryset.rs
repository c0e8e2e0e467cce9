use tracing::debug;

use crate::error::Result;
use crate::model::{Entity, ModelMeta, Value};
use crate::query::offset::{OffsetPager, DEFAULT_OFFSET_STEP};
use crate::query::options::CursorOptions;
use crate::query::range::RangeCursorWrapper;
use crate::query::skinny::SkinnyCursor;
use crate::query::{OrderBy, Predicate, Queryable, RowStream, SliceMarks};

/// Queryable whose streaming iteration is chunked transparently.
///
/// Builder methods pass through to the wrapped query. Streaming picks the
/// cheapest strategy: a key-range scan when the query has no offset and no
/// ordering, offset paging otherwise. [`Queryable::execute`] still runs as one
/// statement, which is what the chunk fetches themselves rely on.
#[derive(Clone, Debug)]
pub struct RangeQuerySet<Q> {
    inner: Q,
    step: i64,
    sorted: bool,
}

impl<Q: Queryable> RangeQuerySet<Q> {
    /// Wraps `inner` with the default chunk size.
    pub fn new(inner: Q) -> Self {
        Self {
            inner,
            step: DEFAULT_OFFSET_STEP as i64,
            sorted: false,
        }
    }

    /// Sets the chunk size used by both strategies.
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    /// Requests key-ordered chunks from the range strategy.
    pub fn sorted(mut self, sorted: bool) -> Self {
        self.sorted = sorted;
        self
    }

    /// Wrapped query.
    pub fn inner(&self) -> &Q {
        &self.inner
    }

    /// Chunk size.
    pub fn step(&self) -> i64 {
        self.step
    }

    /// Row stream; `bypass` skips chunking and streams the wrapped query in
    /// one statement.
    pub fn iterator(&self, bypass: bool) -> Result<RowStream> {
        if bypass {
            return self.inner.stream();
        }
        let marks = self.inner.marks();
        if marks.low == 0 && !self.inner.is_ordered() {
            debug!(model = %self.inner.model().name, step = self.step, "chunked stream: key range");
            let mut query = self.clone();
            query.clear_limits();
            let options = CursorOptions {
                step: self.step,
                limit: marks.high,
                sorted: Some(self.sorted),
                ..CursorOptions::default()
            };
            let scan = RangeCursorWrapper::new(query, options)?.into_iter();
            return Ok(Box::new(scan));
        }
        debug!(model = %self.inner.model().name, step = self.step, "chunked stream: offset");
        let step = self.step.unsigned_abs().min(usize::MAX as u64) as usize;
        Ok(Box::new(OffsetPager::new(self.clone(), step, None)))
    }

    /// Skinny cursor over the chunked stream.
    pub fn skinny(self) -> SkinnyCursor<Self> {
        SkinnyCursor::new(self)
    }

    fn map(&self, inner: Q) -> Self {
        Self {
            inner,
            step: self.step,
            sorted: self.sorted,
        }
    }
}

impl<Q: Queryable> Queryable for RangeQuerySet<Q> {
    type Source = Q::Source;

    fn source(&self) -> &Self::Source {
        self.inner.source()
    }

    fn model(&self) -> &ModelMeta {
        self.inner.model()
    }

    fn database(&self) -> &str {
        self.inner.database()
    }

    fn filter(&self, predicate: Predicate) -> Self {
        self.map(self.inner.filter(predicate))
    }

    fn order_by(&self, order: OrderBy) -> Self {
        self.map(self.inner.order_by(order))
    }

    fn slice(&self, low: usize, high: Option<usize>) -> Self {
        self.map(self.inner.slice(low, high))
    }

    fn marks(&self) -> SliceMarks {
        self.inner.marks()
    }

    fn clear_limits(&mut self) {
        self.inner.clear_limits();
    }

    fn is_ordered(&self) -> bool {
        self.inner.is_ordered()
    }

    fn select_related(&self, relations: &[String]) -> Self {
        self.map(self.inner.select_related(relations))
    }

    fn min_max(&self, field: &str) -> Result<Option<(Value, Value)>> {
        self.inner.min_max(field)
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }

    fn execute(&self) -> Result<Vec<Entity>> {
        self.inner.execute()
    }

    fn stream(&self) -> Result<RowStream> {
        self.iterator(false)
    }
}
