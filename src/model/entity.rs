use std::collections::BTreeMap;
use std::sync::Arc;

use super::value::{Key, Value};

/// A materialized row.
///
/// Besides its field values an entity owns a set of relation cache slots. A
/// slot that was never written is *unset*; a slot holding `None` records that
/// the related row was looked up and not found. Related entities are shared
/// through [`Arc`] so every row pointing at the same key observes the same
/// related entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    model: String,
    fields: BTreeMap<String, Value>,
    cache: BTreeMap<String, Option<Arc<Entity>>>,
}

impl Entity {
    /// Creates an empty entity of the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            fields: BTreeMap::new(),
            cache: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Name of the model this row belongs to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the value of a field, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns a field as a lookup key. Missing and null fields yield `None`.
    pub fn key(&self, name: &str) -> Option<Key> {
        self.get(name).and_then(Value::as_key)
    }

    /// Returns an integer field.
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    /// Sets a field value, replacing any previous one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Iterates over all fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns true when the relation slot has been written, even with `None`.
    pub fn is_cached(&self, slot: &str) -> bool {
        self.cache.contains_key(slot)
    }

    /// Returns the cached related entity.
    ///
    /// The outer `Option` is `None` when the slot is unset; the inner one is
    /// `None` when the related row was not found.
    pub fn cached(&self, slot: &str) -> Option<Option<&Arc<Entity>>> {
        self.cache.get(slot).map(Option::as_ref)
    }

    /// Writes a relation cache slot.
    pub fn set_cached(&mut self, slot: impl Into<String>, related: Option<Arc<Entity>>) {
        self.cache.insert(slot.into(), related);
    }

    /// Clears a relation cache slot back to unset.
    pub fn clear_cached(&mut self, slot: &str) {
        self.cache.remove(slot);
    }
}
