#![allow(clippy::all)]

use dbutils::{
    backend::{FetchKind, MemoryStore},
    error::{DbUtilsError, Result},
    model::{Entity, ModelMeta, PrimaryKey},
    query::{QuerySource, Queryable, RangeQuerySet, SkinnyCursor},
};

fn store(rows: i64) -> Result<MemoryStore> {
    let store = MemoryStore::with_databases(["primary"]).recording();
    store.register(ModelMeta::new("event", PrimaryKey::auto("id")));
    store.insert_many(
        "primary",
        (1..=rows).map(|id| Entity::new("event").with_field("id", id)),
    )?;
    Ok(store)
}

#[test]
fn second_iteration_raises() -> Result<()> {
    let store = store(4)?;
    let mut cursor = SkinnyCursor::objects(&store, "event", "primary")?;
    let first: Vec<Entity> = cursor.iter()?.collect::<Result<_>>()?;
    assert_eq!(first.len(), 4);
    let err = cursor.iter().err().expect("second pass refused");
    assert_eq!(err, DbUtilsError::DoubleIteration);
    assert_eq!(err.code(), "DoubleIteration");
    Ok(())
}

#[test]
fn len_after_iteration_points_to_count() -> Result<()> {
    let store = store(4)?;
    let mut cursor = SkinnyCursor::objects(&store, "event", "primary")?;
    cursor.iter()?.for_each(drop);
    let err = cursor.len().unwrap_err();
    assert!(matches!(err, DbUtilsError::UnsupportedOperation(msg) if msg.contains("count()")));
    store.reset_fetches();
    assert_eq!(cursor.count()?, 4);
    assert_eq!(store.fetches()[0].kind, FetchKind::Count);
    Ok(())
}

#[test]
fn to_list_makes_the_cursor_reusable() -> Result<()> {
    let store = store(3)?;
    let mut cursor = SkinnyCursor::objects(&store, "event", "primary")?;
    let listed = cursor.to_list()?;
    let fetched = store.fetch_count();
    for _ in 0..3 {
        let replay: Vec<Entity> = cursor.iter()?.collect::<Result<_>>()?;
        assert_eq!(replay, listed);
    }
    assert_eq!(cursor.len()?, 3);
    assert_eq!(cursor.count()?, 3);
    assert_eq!(store.fetch_count(), fetched);
    Ok(())
}

#[test]
fn chunked_skinny_cursor_streams_lazily() -> Result<()> {
    let store = store(30)?;
    let mut cursor = RangeQuerySet::new(store.objects("event", "primary")?)
        .with_step(10)
        .skinny();
    let mut rows = cursor.iter()?;
    assert!(rows.next().is_some());
    // bounds plus the first window only
    assert_eq!(store.fetch_count(), 2);
    assert_eq!(rows.count(), 29);
    assert_eq!(store.fetch_count(), 4);
    assert!(cursor.query().inner().marks().high.is_none());
    Ok(())
}

#[test]
fn fetch_failures_surface_through_the_stream() -> Result<()> {
    let store = store(5)?;
    let mut cursor = RangeQuerySet::new(store.objects("event", "primary")?)
        .with_step(2)
        .skinny();
    store.fail_after(2);
    let results: Vec<Result<Entity>> = cursor.iter()?.collect();
    assert_eq!(results.len(), 3);
    assert!(results[..2].iter().all(|r| r.is_ok()));
    assert!(matches!(results[2], Err(DbUtilsError::Backend(_))));
    Ok(())
}
