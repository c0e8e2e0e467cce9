//! Small collection helpers used by the bulk attach.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use crate::model::{Entity, Key};

/// Returns the distinct values of `values`, keeping the first occurrence of each.
pub fn distinct<T, I>(values: I) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

/// Fetched rows indexed by one of their fields.
#[derive(Clone, Debug)]
pub enum RelatedEntitySet {
    /// One entity per key; the first row seen for a key wins.
    Singular(HashMap<Key, Arc<Entity>>),
    /// Every row for a key, in fetch order.
    Plural(HashMap<Key, Vec<Arc<Entity>>>),
}

impl RelatedEntitySet {
    /// Indexes `rows` by `key`, keeping one entity per key. Rows whose key
    /// field is missing or null are dropped.
    pub fn singular(rows: impl IntoIterator<Item = Entity>, key: &str) -> Self {
        let mut map = HashMap::new();
        for row in rows {
            if let Some(k) = row.key(key) {
                map.entry(k).or_insert_with(|| Arc::new(row));
            }
        }
        RelatedEntitySet::Singular(map)
    }

    /// Indexes `rows` by `key`, grouping every row sharing a key.
    pub fn plural(rows: impl IntoIterator<Item = Entity>, key: &str) -> Self {
        let mut map: HashMap<Key, Vec<Arc<Entity>>> = HashMap::new();
        for row in rows {
            if let Some(k) = row.key(key) {
                map.entry(k).or_default().push(Arc::new(row));
            }
        }
        RelatedEntitySet::Plural(map)
    }

    /// Returns the single entity for `key`; for plural sets, the first one.
    pub fn get(&self, key: &Key) -> Option<&Arc<Entity>> {
        match self {
            RelatedEntitySet::Singular(map) => map.get(key),
            RelatedEntitySet::Plural(map) => map.get(key).and_then(|rows| rows.first()),
        }
    }

    /// Returns every entity for `key`.
    pub fn get_all(&self, key: &Key) -> &[Arc<Entity>] {
        match self {
            RelatedEntitySet::Singular(map) => match map.get(key) {
                Some(row) => std::slice::from_ref(row),
                None => &[],
            },
            RelatedEntitySet::Plural(map) => match map.get(key) {
                Some(rows) => rows.as_slice(),
                None => &[],
            },
        }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        match self {
            RelatedEntitySet::Singular(map) => map.len(),
            RelatedEntitySet::Plural(map) => map.len(),
        }
    }

    /// Returns true when no key was indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
