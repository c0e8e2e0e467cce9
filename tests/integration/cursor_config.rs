#![allow(clippy::all)]

use std::fs;

use dbutils::{
    backend::MemoryStore,
    model::{Entity, ModelMeta, PrimaryKey},
    query::{ConfigError, CursorConfig, CursorOptions, QuerySource, RangeCursorWrapper},
};

const CONFIG: &str = r#"
[cursor]
step = 4

[profiles.export]
step = 50
sorted = false
max_id = 12

[profiles.recent]
step = -3
limit = 5
"#;

#[test]
fn loads_profiles_from_a_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("dbutils.toml");
    fs::write(&path, CONFIG)?;

    let config = CursorConfig::load(Some(path.clone()))?;
    assert_eq!(config.path(), Some(path.as_path()));
    let mut profiles: Vec<&str> = config.profiles().collect();
    profiles.sort_unstable();
    assert_eq!(profiles, vec!["export", "recent"]);

    assert_eq!(config.options(None)?, CursorOptions::default().step(4));
    let export = config.options(Some("export"))?;
    assert_eq!(export.step, 50);
    assert!(!export.effective_sorted());
    Ok(())
}

#[test]
fn missing_file_falls_back_to_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = CursorConfig::load(Some(dir.path().join("absent.toml")))?;
    assert_eq!(config.options(None)?, CursorOptions::default());
    Ok(())
}

#[test]
fn malformed_file_reports_its_path() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[cursor]\nstep = \"fast\"\n")?;
    match CursorConfig::load(Some(path.clone())) {
        Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected parse error, got {other:?}"),
    }

    fs::write(&path, "[cursor]\nchunk = 10\n")?;
    assert!(matches!(
        CursorConfig::load(Some(path)),
        Err(ConfigError::Parse { .. })
    ));
    Ok(())
}

#[test]
fn profile_options_drive_a_scan() -> Result<(), Box<dyn std::error::Error>> {
    let config = CursorConfig::from_toml_str(CONFIG)?;
    let store = MemoryStore::with_databases(["primary"]);
    store.register(ModelMeta::new("event", PrimaryKey::auto("id")));
    store.insert_many(
        "primary",
        (1..=20i64).map(|id| Entity::new("event").with_field("id", id)),
    )?;

    let recent = config.options(Some("recent"))?;
    let ids: Vec<i64> = RangeCursorWrapper::new(store.objects("event", "primary")?, recent)?
        .into_iter()
        .map(|row| row.map(|row| row.int("id").unwrap_or_default()))
        .collect::<Result<_, _>>()?;
    assert_eq!(ids, vec![20, 19, 18, 17, 16]);

    let export = config.options(Some("export"))?;
    let count = RangeCursorWrapper::new(store.objects("event", "primary")?, export)?
        .into_iter()
        .count();
    assert_eq!(count, 12);
    Ok(())
}
