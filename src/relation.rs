//! Keyed bulk attach: a LEFT OUTER JOIN performed in memory.
//!
//! Both entry points mutate the caller's entities in place by writing relation
//! cache slots. Slots are written only after the bulk fetch has returned, so a
//! failed fetch leaves every entity untouched.

use tracing::debug;

use crate::error::{DbUtilsError, Result};
use crate::helpers::{distinct, RelatedEntitySet};
use crate::model::{Entity, Key, RelationField, ResolvedRelation};
use crate::query::profile::{profile_timer, record_profile_timer, CursorProfileKind};
use crate::query::{Predicate, QuerySource, Queryable};

/// Attaches `relation` to every entity in `entities` with a single fetch.
///
/// Works for forward relations (the entity holds the foreign key) and reverse
/// one-to-one relations (the related row holds it). Entities whose slot is
/// already populated are skipped unless `related` is non-empty, in which case
/// every slot is refreshed so the nested relations get eager-loaded too.
/// Missing rows leave a `None` in the slot. When no entity has a key to look
/// up, nothing is fetched and no slot is written.
///
/// ```ignore
/// attach_foreign_key(&store, &mut posts, post_meta.relation("thread")?, &[], "primary")?;
/// ```
pub fn attach_foreign_key<S: QuerySource>(
    source: &S,
    entities: &mut [Entity],
    relation: &RelationField,
    related: &[String],
    database: &str,
) -> Result<()> {
    let Some(first) = entities.first() else {
        return Ok(());
    };
    let source_meta = source.model_meta(first.model())?;
    let related_meta = source.model_meta(&relation.related_model)?;
    let resolved = relation.resolve(&source_meta, &related_meta);

    let force = !related.is_empty();
    let values = distinct(
        entities
            .iter()
            .filter(|entity| force || !entity.is_cached(&resolved.cache_slot))
            .filter_map(|entity| entity.key(&resolved.column)),
    );
    if values.is_empty() {
        return Ok(());
    }

    let query = source.objects(&relation.related_model, database)?;
    let fetched = fetch_related(query, &resolved.lookup, &resolved.key, values, related)?;
    apply(entities, &resolved, &fetched, force);
    Ok(())
}

/// Attaches the same related model across several entity collections with one
/// shared fetch, e.g. posts' authors and threads' creators.
///
/// Only forward relations are supported. Every relation must target the same
/// model; both checks run before anything is fetched.
pub fn attach_foreign_keys<S: QuerySource>(
    source: &S,
    sets: &mut [(&mut [Entity], &RelationField)],
    related: &[String],
    database: &str,
) -> Result<()> {
    let Some((_, head)) = sets.first() else {
        return Ok(());
    };
    let target = head.related_model.clone();
    for (_, relation) in sets.iter() {
        if !relation.is_forward() {
            return Err(DbUtilsError::UnsupportedOperation(
                "attach_foreign_keys only supports forward relations",
            ));
        }
        if relation.related_model != target {
            return Err(DbUtilsError::IncompatibleRelation {
                expected: target,
                found: relation.related_model.clone(),
            });
        }
    }

    let related_meta = source.model_meta(&target)?;
    let force = !related.is_empty();

    let mut resolved = Vec::with_capacity(sets.len());
    let mut values = Vec::new();
    for (entities, relation) in sets.iter() {
        let Some(first) = entities.first() else {
            resolved.push(None);
            continue;
        };
        let res = relation.resolve(&source.model_meta(first.model())?, &related_meta);
        values.extend(
            entities
                .iter()
                .filter(|entity| force || !entity.is_cached(&res.cache_slot))
                .filter_map(|entity| entity.key(&res.column)),
        );
        resolved.push(Some(res));
    }

    let values = distinct(values);
    if values.is_empty() {
        return Ok(());
    }

    let query = source.objects(&target, database)?;
    let pk = &related_meta.pk.field;
    let fetched = fetch_related(query, pk, pk, values, related)?;
    for ((entities, _), res) in sets.iter_mut().zip(&resolved) {
        if let Some(res) = res {
            apply(entities, res, &fetched, force);
        }
    }
    Ok(())
}

fn fetch_related<Q: Queryable>(
    query: Q,
    lookup: &str,
    key: &str,
    values: Vec<Key>,
    related: &[String],
) -> Result<RelatedEntitySet> {
    debug!(
        model = %query.model().name,
        database = %query.database(),
        keys = values.len(),
        "bulk attach fetch"
    );
    let mut query = query.filter(Predicate::is_in(lookup, values));
    if !related.is_empty() {
        query = query.select_related(related);
    }
    let timer = profile_timer();
    let rows = query.execute()?;
    record_profile_timer(CursorProfileKind::Attach, timer);
    Ok(RelatedEntitySet::singular(rows, key))
}

fn apply(entities: &mut [Entity], res: &ResolvedRelation, fetched: &RelatedEntitySet, force: bool) {
    for entity in entities.iter_mut() {
        if !force && entity.is_cached(&res.cache_slot) {
            continue;
        }
        let found = entity
            .key(&res.column)
            .and_then(|k| fetched.get(&k))
            .cloned();
        entity.set_cached(res.cache_slot.clone(), found);
    }
}

