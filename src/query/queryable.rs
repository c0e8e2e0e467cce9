//! Contracts consumed from the relational model layer.
//!
//! A [`Queryable`] is a cheap, clonable handle to a pending query. Every
//! builder method returns a new handle; nothing touches the store until
//! [`Queryable::execute`], [`Queryable::min_max`] or [`Queryable::count`] runs.

use std::cmp::min;

use crate::error::Result;
use crate::model::{Entity, ModelMeta, Value};

/// Boxed lazy row stream. Fetch failures surface as `Some(Err(_))`.
pub type RowStream = Box<dyn Iterator<Item = Result<Entity>>>;

/// Comparison operator used by [`Predicate::Cmp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    /// Equal.
    Eq,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Gte,
}

/// Abstract filter predicate handed to the backing queryable.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `field BETWEEN low AND high`, both bounds inclusive.
    Between {
        /// Filtered field.
        field: String,
        /// Inclusive lower bound.
        low: Value,
        /// Inclusive upper bound.
        high: Value,
    },
    /// `field <op> value`.
    Cmp {
        /// Filtered field.
        field: String,
        /// Comparison operator.
        op: CmpOp,
        /// Right-hand side.
        value: Value,
    },
    /// `field IN (values)`.
    In {
        /// Filtered field.
        field: String,
        /// Accepted values.
        values: Vec<Value>,
    },
}

impl Predicate {
    /// Inclusive range predicate.
    pub fn between(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Predicate::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    /// Membership predicate.
    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Comparison predicate.
    pub fn cmp(field: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Predicate::Cmp {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Equality predicate.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(field, CmpOp::Eq, value)
    }

    /// Field the predicate constrains.
    pub fn field(&self) -> &str {
        match self {
            Predicate::Between { field, .. }
            | Predicate::Cmp { field, .. }
            | Predicate::In { field, .. } => field,
        }
    }
}

/// One ordering term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    /// Field to order by.
    pub field: String,
    /// Descending when true.
    pub descending: bool,
}

impl OrderBy {
    /// Ascending order on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending order on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Low/high slice marks of a pending query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SliceMarks {
    /// Rows skipped before the first returned row.
    pub low: usize,
    /// Exclusive end offset, if bounded.
    pub high: Option<usize>,
}

impl SliceMarks {
    /// Returns true when either mark is set.
    pub fn is_sliced(&self) -> bool {
        self.low != 0 || self.high.is_some()
    }

    /// Applies a slice relative to the marks already in place; a slice of a
    /// slice never widens the original window.
    pub fn apply(self, low: usize, high: Option<usize>) -> Self {
        let mut out = self;
        if let Some(high) = high {
            let relative = self.low.saturating_add(high);
            out.high = Some(match self.high {
                Some(current) => min(current, relative),
                None => relative,
            });
        }
        let relative = self.low.saturating_add(low);
        out.low = match self.high {
            Some(current) => min(current, relative),
            None => relative,
        };
        out
    }

    /// Number of rows the window admits, if bounded.
    pub fn window(&self) -> Option<usize> {
        self.high.map(|high| high.saturating_sub(self.low))
    }
}

/// Factory for fresh queryables, one per model and database alias.
pub trait QuerySource {
    /// Queryable type produced by this source.
    type Query: Queryable;

    /// Returns an unfiltered queryable over `model` on `database`.
    fn objects(&self, model: &str, database: &str) -> Result<Self::Query>;

    /// Returns the metadata registered for `model`.
    fn model_meta(&self, model: &str) -> Result<ModelMeta>;
}

/// Pending query over one model.
pub trait Queryable: Clone + 'static {
    /// Source used to reach related models on the same backend.
    type Source: QuerySource;

    /// Backend this query runs against.
    fn source(&self) -> &Self::Source;

    /// Metadata of the target model.
    fn model(&self) -> &ModelMeta;

    /// Database alias the query runs against.
    fn database(&self) -> &str;

    /// Adds a filter predicate.
    fn filter(&self, predicate: Predicate) -> Self;

    /// Appends an ordering term.
    fn order_by(&self, order: OrderBy) -> Self;

    /// Applies `[low:high]` relative to the existing slice marks.
    fn slice(&self, low: usize, high: Option<usize>) -> Self;

    /// Current slice marks.
    fn marks(&self) -> SliceMarks;

    /// Drops both slice marks.
    fn clear_limits(&mut self);

    /// Returns true when an explicit ordering has been requested.
    fn is_ordered(&self) -> bool;

    /// Eager-loads the named relations on every executed row.
    fn select_related(&self, relations: &[String]) -> Self;

    /// MIN/MAX aggregate of `field` over the filtered rows; `None` if no rows match.
    fn min_max(&self, field: &str) -> Result<Option<(Value, Value)>>;

    /// Number of rows the query would return.
    fn count(&self) -> Result<usize> {
        Ok(self.execute()?.len())
    }

    /// Executes the query once and materializes every row.
    fn execute(&self) -> Result<Vec<Entity>>;

    /// Per-row executor. The default materializes through
    /// [`Queryable::execute`]; backends that can read row by row override it.
    fn stream(&self) -> Result<RowStream> {
        let rows = self.execute()?;
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}
