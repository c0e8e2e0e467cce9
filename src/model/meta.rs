//! Model metadata: primary-key descriptors and relation fields.

use std::collections::BTreeMap;

use crate::error::{DbUtilsError, Result};

/// Semantic type of a primary key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    /// Plain integer key.
    Integer,
    /// Integer key assigned by the store.
    AutoIncrement,
    /// Any other key type (strings, UUIDs, composite encodings...).
    Other,
}

impl KeyKind {
    /// Returns true when range arithmetic is defined for the key.
    pub fn is_integer(self) -> bool {
        matches!(self, KeyKind::Integer | KeyKind::AutoIncrement)
    }
}

/// Primary-key field descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryKey {
    /// Field name holding the key.
    pub field: String,
    /// Semantic type of the key.
    pub kind: KeyKind,
}

impl PrimaryKey {
    /// Auto-increment integer key.
    pub fn auto(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: KeyKind::AutoIncrement,
        }
    }

    /// Key of an arbitrary kind.
    pub fn new(field: impl Into<String>, kind: KeyKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

/// Which side of a relation holds the foreign key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// The source row holds the foreign key in `column`.
    Forward {
        /// Foreign-key column on the source model.
        column: String,
    },
    /// The related row holds a unique foreign key in `field` pointing back at
    /// the source's primary key.
    ReverseOneToOne {
        /// Foreign-key field on the related model.
        field: String,
    },
}

/// A named relation declared on a model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationField {
    /// Accessor name; also the cache slot written on the source entity.
    pub name: String,
    /// Model the relation points at.
    pub related_model: String,
    /// Which side holds the foreign key.
    pub kind: RelationKind,
}

impl RelationField {
    /// Forward relation: `column` on the source references the related primary key.
    pub fn forward(
        name: impl Into<String>,
        related_model: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            related_model: related_model.into(),
            kind: RelationKind::Forward {
                column: column.into(),
            },
        }
    }

    /// Reverse one-to-one relation: `field` on the related model references the
    /// source primary key.
    pub fn reverse_one_to_one(
        name: impl Into<String>,
        related_model: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            related_model: related_model.into(),
            kind: RelationKind::ReverseOneToOne {
                field: field.into(),
            },
        }
    }

    /// Returns true for [`RelationKind::Forward`].
    pub fn is_forward(&self) -> bool {
        matches!(self.kind, RelationKind::Forward { .. })
    }

    /// Resolves the relation against both models' metadata.
    pub fn resolve(&self, source: &ModelMeta, related: &ModelMeta) -> ResolvedRelation {
        match &self.kind {
            RelationKind::Forward { column } => ResolvedRelation {
                cache_slot: self.name.clone(),
                column: column.clone(),
                lookup: related.pk.field.clone(),
                key: related.pk.field.clone(),
            },
            RelationKind::ReverseOneToOne { field } => ResolvedRelation {
                cache_slot: self.name.clone(),
                column: source.pk.field.clone(),
                lookup: field.clone(),
                key: field.clone(),
            },
        }
    }
}

/// Relation flattened into the four names the bulk attach works with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRelation {
    /// Slot written on each source entity.
    pub cache_slot: String,
    /// Source field whose value is looked up.
    pub column: String,
    /// Related field filtered with `IN (values)`.
    pub lookup: String,
    /// Related field the fetched rows are indexed by.
    pub key: String,
}

/// Schema information for one model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelMeta {
    /// Model name.
    pub name: String,
    /// Primary-key descriptor.
    pub pk: PrimaryKey,
    relations: BTreeMap<String, RelationField>,
}

impl ModelMeta {
    /// Creates metadata without relations.
    pub fn new(name: impl Into<String>, pk: PrimaryKey) -> Self {
        Self {
            name: name.into(),
            pk,
            relations: BTreeMap::new(),
        }
    }

    /// Registers a relation.
    pub fn with_relation(mut self, relation: RelationField) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    /// Looks up a relation by accessor name.
    pub fn relation(&self, name: &str) -> Result<&RelationField> {
        self.relations
            .get(name)
            .ok_or_else(|| DbUtilsError::unknown_relation(&self.name, name))
    }

    /// Iterates over the declared relations.
    pub fn relations(&self) -> impl Iterator<Item = &RelationField> {
        self.relations.values()
    }
}
