use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{DbUtilsError, Result};
use crate::model::{Entity, ModelMeta, Value};
use crate::query::{CmpOp, OrderBy, Predicate, QuerySource, Queryable, RowStream, SliceMarks};
use crate::relation::attach_foreign_key;

/// Kind of round trip recorded in the fetch log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchKind {
    /// Row fetch.
    Execute,
    /// MIN/MAX aggregate.
    Aggregate,
    /// COUNT aggregate.
    Count,
}

/// One round trip against a [`MemoryStore`].
#[derive(Clone, Debug, PartialEq)]
pub struct FetchRecord {
    /// Queried model.
    pub model: String,
    /// Database alias the query ran against.
    pub database: String,
    /// Kind of round trip.
    pub kind: FetchKind,
    /// Filters in effect.
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Default)]
struct StoreInner {
    models: HashMap<String, ModelMeta>,
    databases: HashMap<String, HashMap<String, Vec<Entity>>>,
    fetches: Vec<FetchRecord>,
    recording: bool,
    fail_after: Option<usize>,
}

impl StoreInner {
    fn table(&self, database: &str, model: &str) -> Result<&[Entity]> {
        let tables = self
            .databases
            .get(database)
            .ok_or_else(|| DbUtilsError::UnknownDatabase(database.to_string()))?;
        Ok(tables.get(model).map(Vec::as_slice).unwrap_or(&[]))
    }

    fn record(&mut self, query: &MemoryQuery, kind: FetchKind) -> Result<()> {
        match self.fail_after {
            Some(0) => {
                return Err(DbUtilsError::Backend(format!(
                    "injected failure on {} ({kind:?})",
                    query.model.name
                )))
            }
            Some(n) => self.fail_after = Some(n - 1),
            None => {}
        }
        if self.recording {
            self.fetches.push(FetchRecord {
                model: query.model.name.clone(),
                database: query.database.clone(),
                kind,
                predicates: query.predicates.clone(),
            });
        }
        Ok(())
    }
}

/// Shared in-memory store keyed by database alias and model name.
///
/// Rows keep insertion order, which is what unordered queries return. With
/// recording enabled every round trip is appended to a fetch log so callers
/// can assert how many queries an operation issued. Recording is off by
/// default and the log only grows while it is on.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    /// Creates a store without databases or models.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with the given database aliases.
    pub fn with_databases<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for alias in aliases {
            store.add_database(alias);
        }
        store
    }

    /// Adds a database alias. Existing aliases are left untouched.
    pub fn add_database(&self, alias: impl Into<String>) {
        self.inner.lock().databases.entry(alias.into()).or_default();
    }

    /// Registers (or replaces) a model's metadata.
    pub fn register(&self, meta: ModelMeta) {
        self.inner.lock().models.insert(meta.name.clone(), meta);
    }

    /// Appends a row to its model's table on `database`.
    pub fn insert(&self, database: &str, entity: Entity) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.models.contains_key(entity.model()) {
            return Err(DbUtilsError::UnknownModel(entity.model().to_string()));
        }
        let tables = inner
            .databases
            .get_mut(database)
            .ok_or_else(|| DbUtilsError::UnknownDatabase(database.to_string()))?;
        tables
            .entry(entity.model().to_string())
            .or_default()
            .push(entity);
        Ok(())
    }

    /// Appends several rows.
    pub fn insert_many(&self, database: &str, entities: impl IntoIterator<Item = Entity>) -> Result<()> {
        entities
            .into_iter()
            .try_for_each(|entity| self.insert(database, entity))
    }

    /// Enables the fetch log.
    pub fn recording(self) -> Self {
        self.record_fetches(true);
        self
    }

    /// Turns the fetch log on or off. Turning it off also clears it.
    pub fn record_fetches(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        inner.recording = enabled;
        if !enabled {
            inner.fetches.clear();
        }
    }

    /// Snapshot of the fetch log.
    pub fn fetches(&self) -> Vec<FetchRecord> {
        self.inner.lock().fetches.clone()
    }

    /// Number of logged round trips.
    pub fn fetch_count(&self) -> usize {
        self.inner.lock().fetches.len()
    }

    /// Clears the fetch log.
    pub fn reset_fetches(&self) {
        self.inner.lock().fetches.clear();
    }

    /// Makes every round trip after the next `fetches` ones fail with
    /// [`DbUtilsError::Backend`]. Round trips are counted whether or not
    /// recording is enabled.
    pub fn fail_after(&self, fetches: usize) {
        self.inner.lock().fail_after = Some(fetches);
    }

    /// Cancels a pending [`MemoryStore::fail_after`].
    pub fn clear_failure(&self) {
        self.inner.lock().fail_after = None;
    }
}

impl QuerySource for MemoryStore {
    type Query = MemoryQuery;

    fn objects(&self, model: &str, database: &str) -> Result<MemoryQuery> {
        let meta = self.model_meta(model)?;
        if !self.inner.lock().databases.contains_key(database) {
            return Err(DbUtilsError::UnknownDatabase(database.to_string()));
        }
        Ok(MemoryQuery {
            store: self.clone(),
            model: meta,
            database: database.to_string(),
            predicates: Vec::new(),
            order: Vec::new(),
            marks: SliceMarks::default(),
            related: Vec::new(),
        })
    }

    fn model_meta(&self, model: &str) -> Result<ModelMeta> {
        self.inner
            .lock()
            .models
            .get(model)
            .cloned()
            .ok_or_else(|| DbUtilsError::UnknownModel(model.to_string()))
    }
}

/// Pending query against a [`MemoryStore`].
#[derive(Clone, Debug)]
pub struct MemoryQuery {
    store: MemoryStore,
    model: ModelMeta,
    database: String,
    predicates: Vec<Predicate>,
    order: Vec<OrderBy>,
    marks: SliceMarks,
    related: Vec<String>,
}

impl MemoryQuery {
    /// Filters in effect.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Records the round trip and returns the filtered rows in table order.
    fn filtered(&self, kind: FetchKind) -> Result<Vec<Entity>> {
        let mut inner = self.store.inner.lock();
        inner.record(self, kind)?;
        let rows = inner
            .table(&self.database, &self.model.name)?
            .iter()
            .filter(|entity| self.predicates.iter().all(|p| matches(entity, p)))
            .cloned()
            .collect();
        Ok(rows)
    }

    fn windowed(&self, rows: Vec<Entity>) -> Vec<Entity> {
        if !self.marks.is_sliced() {
            return rows;
        }
        let take = self.marks.window().unwrap_or(usize::MAX);
        rows.into_iter().skip(self.marks.low).take(take).collect()
    }
}

impl Queryable for MemoryQuery {
    type Source = MemoryStore;

    fn source(&self) -> &MemoryStore {
        &self.store
    }

    fn model(&self) -> &ModelMeta {
        &self.model
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn filter(&self, predicate: Predicate) -> Self {
        let mut next = self.clone();
        next.predicates.push(predicate);
        next
    }

    fn order_by(&self, order: OrderBy) -> Self {
        let mut next = self.clone();
        next.order.push(order);
        next
    }

    fn slice(&self, low: usize, high: Option<usize>) -> Self {
        let mut next = self.clone();
        next.marks = self.marks.apply(low, high);
        next
    }

    fn marks(&self) -> SliceMarks {
        self.marks
    }

    fn clear_limits(&mut self) {
        self.marks = SliceMarks::default();
    }

    fn is_ordered(&self) -> bool {
        !self.order.is_empty()
    }

    fn select_related(&self, relations: &[String]) -> Self {
        let mut next = self.clone();
        next.related.extend(relations.iter().cloned());
        next
    }

    fn min_max(&self, field: &str) -> Result<Option<(Value, Value)>> {
        let rows = self.filtered(FetchKind::Aggregate)?;
        let mut bounds: Option<(Value, Value)> = None;
        for value in rows.iter().filter_map(|row| row.get(field)) {
            if value.is_null() {
                continue;
            }
            bounds = Some(match bounds {
                None => (value.clone(), value.clone()),
                Some((low, high)) => {
                    let low = if value.partial_cmp_value(&low) == Some(Ordering::Less) {
                        value.clone()
                    } else {
                        low
                    };
                    let high = if value.partial_cmp_value(&high) == Some(Ordering::Greater) {
                        value.clone()
                    } else {
                        high
                    };
                    (low, high)
                }
            });
        }
        Ok(bounds)
    }

    fn count(&self) -> Result<usize> {
        let rows = self.filtered(FetchKind::Count)?;
        Ok(self.windowed(rows).len())
    }

    fn execute(&self) -> Result<Vec<Entity>> {
        let mut rows = self.filtered(FetchKind::Execute)?;
        if !self.order.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &self.order));
        }
        let mut rows = self.windowed(rows);
        trace!(
            model = %self.model.name,
            database = %self.database,
            rows = rows.len(),
            "memory execute"
        );

        // Distinct relation names so a repeated entry is attached once.
        let related: BTreeSet<&String> = self.related.iter().collect();
        for name in related {
            let (relation, nested) = match name.split_once('.') {
                Some((relation, rest)) => (relation, vec![rest.to_string()]),
                None => (name.as_str(), Vec::new()),
            };
            let field = self.model.relation(relation)?;
            attach_foreign_key(&self.store, &mut rows, field, &nested, &self.database)?;
        }
        Ok(rows)
    }

    /// Unordered queries without eager loading read the table one row at a
    /// time; everything else goes through [`Queryable::execute`].
    fn stream(&self) -> Result<RowStream> {
        if !self.order.is_empty() || !self.related.is_empty() {
            let rows = self.execute()?;
            return Ok(Box::new(rows.into_iter().map(Ok)));
        }
        {
            let mut inner = self.store.inner.lock();
            inner.record(self, FetchKind::Execute)?;
            inner.table(&self.database, &self.model.name)?;
        }
        Ok(Box::new(MemoryRows {
            query: self.clone(),
            position: 0,
            skip: self.marks.low,
            remaining: self.marks.window(),
            done: false,
        }))
    }
}

/// Row-at-a-time cursor over a table. Rows appended during iteration are
/// visible to it.
struct MemoryRows {
    query: MemoryQuery,
    position: usize,
    skip: usize,
    remaining: Option<usize>,
    done: bool,
}

impl Iterator for MemoryRows {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        let inner = self.query.store.inner.lock();
        let table = match inner.table(&self.query.database, &self.query.model.name) {
            Ok(table) => table,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        while let Some(row) = table.get(self.position) {
            self.position += 1;
            if !self.query.predicates.iter().all(|p| matches(row, p)) {
                continue;
            }
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            return Some(Ok(row.clone()));
        }
        self.done = true;
        None
    }
}

fn matches(entity: &Entity, predicate: &Predicate) -> bool {
    let Some(value) = entity.get(predicate.field()) else {
        return false;
    };
    match predicate {
        Predicate::Between { low, high, .. } => {
            matches!(
                value.partial_cmp_value(low),
                Some(Ordering::Greater | Ordering::Equal)
            ) && matches!(
                value.partial_cmp_value(high),
                Some(Ordering::Less | Ordering::Equal)
            )
        }
        Predicate::Cmp { op, value: rhs, .. } => {
            let Some(ord) = value.partial_cmp_value(rhs) else {
                return false;
            };
            match op {
                CmpOp::Eq => ord == Ordering::Equal,
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Lte => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::Gte => ord != Ordering::Less,
            }
        }
        Predicate::In { values, .. } => values
            .iter()
            .any(|candidate| value.partial_cmp_value(candidate) == Some(Ordering::Equal)),
    }
}

/// Nulls and missing fields sort first.
fn compare_rows(a: &Entity, b: &Entity, order: &[OrderBy]) -> Ordering {
    for term in order {
        let left = a.get(&term.field).filter(|v| !v.is_null());
        let right = b.get(&term.field).filter(|v| !v.is_null());
        let ord = match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(l), Some(r)) => l.partial_cmp_value(r).unwrap_or(Ordering::Equal),
        };
        let ord = if term.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
