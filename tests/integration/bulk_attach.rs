#![allow(clippy::all)]

use std::sync::Arc;

use dbutils::{
    attach_foreign_key, attach_foreign_keys,
    backend::{FetchKind, MemoryStore},
    error::{DbUtilsError, Result},
    model::{Entity, Key, ModelMeta, PrimaryKey, RelationField, Value},
    query::{Predicate, QuerySource, Queryable},
};

const DB: &str = "primary";

fn forum() -> Result<MemoryStore> {
    let store = MemoryStore::with_databases([DB]).recording();
    store.register(
        ModelMeta::new("user", PrimaryKey::auto("id"))
            .with_relation(RelationField::reverse_one_to_one("profile", "profile", "user_id")),
    );
    store.register(ModelMeta::new("profile", PrimaryKey::auto("id")));
    store.register(ModelMeta::new("category", PrimaryKey::auto("id")));
    store.register(
        ModelMeta::new("thread", PrimaryKey::auto("id"))
            .with_relation(RelationField::forward("creator", "user", "creator_id"))
            .with_relation(RelationField::forward("category", "category", "category_id")),
    );
    store.register(
        ModelMeta::new("post", PrimaryKey::auto("id"))
            .with_relation(RelationField::forward("author", "user", "author_id")),
    );
    for (id, name) in [(1i64, "A"), (2, "B"), (3, "C")] {
        store.insert(DB, Entity::new("user").with_field("id", id).with_field("name", name))?;
    }
    store.insert(
        DB,
        Entity::new("profile")
            .with_field("id", 50i64)
            .with_field("user_id", 2i64)
            .with_field("bio", "hello"),
    )?;
    store.insert(DB, Entity::new("category").with_field("id", 1i64))?;
    Ok(store)
}

fn post(id: i64, author: Option<i64>) -> Entity {
    Entity::new("post")
        .with_field("id", id)
        .with_field("author_id", author)
}

fn thread(id: i64, creator: i64) -> Entity {
    Entity::new("thread")
        .with_field("id", id)
        .with_field("creator_id", creator)
        .with_field("category_id", 1i64)
}

fn cached_name(entity: &Entity, slot: &str) -> Option<Option<String>> {
    entity.cached(slot).map(|related| {
        related.and_then(|row| match row.get("name") {
            Some(Value::String(name)) => Some(name.clone()),
            _ => None,
        })
    })
}

fn relation(store: &MemoryStore, model: &str, name: &str) -> Result<RelationField> {
    Ok(store.model_meta(model)?.relation(name)?.clone())
}

#[test]
fn one_fetch_fills_every_slot() -> Result<()> {
    let store = forum()?;
    let author = relation(&store, "post", "author")?;
    let mut posts = vec![post(1, Some(1)), post(2, Some(2)), post(3, Some(1))];

    attach_foreign_key(&store, &mut posts, &author, &[], DB)?;

    let names: Vec<_> = posts.iter().map(|p| cached_name(p, "author")).collect();
    assert_eq!(
        names,
        vec![
            Some(Some("A".to_string())),
            Some(Some("B".to_string())),
            Some(Some("A".to_string()))
        ]
    );
    let fetches = store.fetches();
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].kind, FetchKind::Execute);
    assert_eq!(
        fetches[0].predicates,
        vec![Predicate::is_in("id", [Key::Int(1), Key::Int(2)])]
    );
    Ok(())
}

#[test]
fn attached_rows_match_a_direct_lookup() -> Result<()> {
    let store = forum()?;
    let author = relation(&store, "post", "author")?;
    let mut posts = vec![post(1, Some(2)), post(2, Some(3)), post(3, Some(2))];
    attach_foreign_key(&store, &mut posts, &author, &[], DB)?;

    for p in &posts {
        let id = p.int("author_id").expect("author id");
        let direct = store
            .objects("user", DB)?
            .filter(Predicate::eq("id", id))
            .execute()?;
        assert_eq!(direct.len(), 1);
        let attached = p.cached("author").flatten().expect("attached");
        assert_eq!(attached.as_ref(), &direct[0]);
    }
    Ok(())
}

#[test]
fn rows_sharing_a_key_share_the_entity() -> Result<()> {
    let store = forum()?;
    let author = relation(&store, "post", "author")?;
    let mut posts = vec![post(1, Some(3)), post(2, Some(3))];
    attach_foreign_key(&store, &mut posts, &author, &[], DB)?;
    let first = posts[0].cached("author").flatten().expect("attached");
    let second = posts[1].cached("author").flatten().expect("attached");
    assert!(Arc::ptr_eq(first, second));
    Ok(())
}

#[test]
fn missing_and_null_keys_resolve_to_none() -> Result<()> {
    let store = forum()?;
    let author = relation(&store, "post", "author")?;
    let mut posts = vec![post(1, Some(99)), post(2, None)];
    attach_foreign_key(&store, &mut posts, &author, &[], DB)?;
    assert_eq!(cached_name(&posts[0], "author"), Some(None));
    assert_eq!(cached_name(&posts[1], "author"), Some(None));

    let mut only_nulls = vec![post(3, None)];
    store.reset_fetches();
    attach_foreign_key(&store, &mut only_nulls, &author, &[], DB)?;
    assert_eq!(store.fetch_count(), 0);
    assert!(!only_nulls[0].is_cached("author"));
    Ok(())
}

#[test]
fn nothing_to_look_up_touches_neither_store_nor_slots() -> Result<()> {
    let store = forum()?;
    let author = relation(&store, "post", "author")?;
    let creator = relation(&store, "thread", "creator")?;

    let mut posts = vec![post(1, None), post(2, None)];
    attach_foreign_key(&store, &mut posts, &author, &[], "replica")?;
    assert!(posts.iter().all(|p| !p.is_cached("author")));

    let stale = Arc::new(Entity::new("user").with_field("id", 3i64));
    let mut threads = vec![thread(1, 3)];
    threads[0].set_cached("creator", Some(stale));
    attach_foreign_keys(
        &store,
        &mut [(&mut posts[..], &author), (&mut threads[..], &creator)],
        &[],
        "replica",
    )?;
    assert!(!posts[0].is_cached("author"));
    assert!(threads[0].cached("creator").flatten().is_some());
    assert_eq!(store.fetch_count(), 0);

    let err = attach_foreign_key(&store, &mut threads, &creator, &["profile".to_string()], "replica")
        .unwrap_err();
    assert_eq!(err, DbUtilsError::UnknownDatabase("replica".into()));
    Ok(())
}

#[test]
fn cached_slots_are_kept_unless_nested_relations_are_requested() -> Result<()> {
    let store = forum()?;
    let author = relation(&store, "post", "author")?;
    let stale = Arc::new(Entity::new("user").with_field("id", 1i64).with_field("name", "stale"));
    let mut cached = post(1, Some(1));
    cached.set_cached("author", Some(stale));
    let mut posts = vec![cached, post(2, Some(2))];

    attach_foreign_key(&store, &mut posts, &author, &[], DB)?;
    assert_eq!(cached_name(&posts[0], "author"), Some(Some("stale".to_string())));
    assert_eq!(cached_name(&posts[1], "author"), Some(Some("B".to_string())));
    assert_eq!(
        store.fetches()[0].predicates,
        vec![Predicate::is_in("id", [Key::Int(2)])]
    );

    attach_foreign_key(&store, &mut posts, &author, &["profile".to_string()], DB)?;
    assert_eq!(cached_name(&posts[0], "author"), Some(Some("A".to_string())));
    let b = posts[1].cached("author").flatten().expect("attached");
    let profile = b.cached("profile").flatten().expect("profile attached");
    assert_eq!(profile.get("bio"), Some(&Value::from("hello")));
    Ok(())
}

#[test]
fn reverse_one_to_one_matches_on_the_related_column() -> Result<()> {
    let store = forum()?;
    let profile = relation(&store, "user", "profile")?;
    let mut users = store.objects("user", DB)?.execute()?;
    store.reset_fetches();

    attach_foreign_key(&store, &mut users, &profile, &[], DB)?;

    let bios: Vec<Option<Value>> = users
        .iter()
        .map(|u| {
            u.cached("profile")
                .flatten()
                .and_then(|p| p.get("bio").cloned())
        })
        .collect();
    assert_eq!(bios, vec![None, Some(Value::from("hello")), None]);
    assert_eq!(
        store.fetches()[0].predicates,
        vec![Predicate::is_in("user_id", [Key::Int(1), Key::Int(2), Key::Int(3)])]
    );
    Ok(())
}

#[test]
fn several_collections_share_one_fetch() -> Result<()> {
    let store = forum()?;
    let author = relation(&store, "post", "author")?;
    let creator = relation(&store, "thread", "creator")?;
    let mut posts = vec![post(1, Some(1)), post(2, Some(2))];
    let mut threads = vec![thread(1, 2), thread(2, 3)];

    attach_foreign_keys(
        &store,
        &mut [(&mut posts[..], &author), (&mut threads[..], &creator)],
        &[],
        DB,
    )?;

    assert_eq!(store.fetch_count(), 1);
    assert_eq!(
        store.fetches()[0].predicates,
        vec![Predicate::is_in("id", [Key::Int(1), Key::Int(2), Key::Int(3)])]
    );
    assert_eq!(cached_name(&posts[1], "author"), Some(Some("B".to_string())));
    assert_eq!(cached_name(&threads[1], "creator"), Some(Some("C".to_string())));
    let shared_post = posts[1].cached("author").flatten().expect("attached");
    let shared_thread = threads[0].cached("creator").flatten().expect("attached");
    assert!(Arc::ptr_eq(shared_post, shared_thread));
    Ok(())
}

#[test]
fn mismatched_targets_fail_before_fetching() -> Result<()> {
    let store = forum()?;
    let author = relation(&store, "post", "author")?;
    let category = relation(&store, "thread", "category")?;
    let mut posts = vec![post(1, Some(1))];
    let mut threads = vec![thread(1, 2)];

    let err = attach_foreign_keys(
        &store,
        &mut [(&mut posts[..], &author), (&mut threads[..], &category)],
        &[],
        DB,
    )
    .unwrap_err();

    assert_eq!(
        err,
        DbUtilsError::IncompatibleRelation {
            expected: "user".into(),
            found: "category".into(),
        }
    );
    assert_eq!(err.code(), "IncompatibleRelation");
    assert_eq!(store.fetch_count(), 0);
    assert!(!posts[0].is_cached("author"));
    Ok(())
}

#[test]
fn reverse_relations_are_refused_for_shared_fetches() -> Result<()> {
    let store = forum()?;
    let profile = relation(&store, "user", "profile")?;
    let mut users = vec![Entity::new("user").with_field("id", 1i64)];
    let err = attach_foreign_keys(&store, &mut [(&mut users[..], &profile)], &[], DB).unwrap_err();
    assert!(matches!(err, DbUtilsError::UnsupportedOperation(_)));
    assert_eq!(store.fetch_count(), 0);
    Ok(())
}

#[test]
fn failed_fetch_leaves_entities_untouched() -> Result<()> {
    let store = forum()?;
    let author = relation(&store, "post", "author")?;
    let mut posts = vec![post(1, Some(1))];
    store.fail_after(0);
    assert!(attach_foreign_key(&store, &mut posts, &author, &[], DB).is_err());
    assert!(!posts[0].is_cached("author"));
    Ok(())
}

#[test]
fn empty_inputs_are_no_ops() -> Result<()> {
    let store = forum()?;
    let author = relation(&store, "post", "author")?;
    attach_foreign_key(&store, &mut [], &author, &[], DB)?;
    attach_foreign_keys(&store, &mut [], &[], DB)?;
    assert_eq!(store.fetch_count(), 0);
    Ok(())
}
