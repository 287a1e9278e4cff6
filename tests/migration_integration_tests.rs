/// End-to-end migration tests against stores on disk
///
/// Run with: cargo test --test migration_integration_tests

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use storemigrator::{
    DataType, EntityDef, EntityMapping, FieldDef, InMemoryCatalog, MappingRegistry, MappingRule,
    MigrateError, MigrationEvent, MigrationOutcome, MigrationState, Migrator, MigratorConfig, Record,
    Schema, SchemaVersion, StoreDocument, StoreLocks, Value, read_declared_version, read_document,
    save_document,
};
use tempfile::TempDir;

/// "Model 23" through "Model 31"; each model adds one counter field to `Item`.
fn model_catalog() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    for model in 23..=31 {
        let mut fields = vec![
            FieldDef::new("id", DataType::Integer).not_null(),
            FieldDef::new("name", DataType::Text),
        ];
        for added in 24..=model {
            fields.push(FieldDef::new(format!("f{}", added), DataType::Integer).not_null());
        }
        let schema = Schema::new(vec![EntityDef::new("Item", fields)]);
        catalog = catalog.with_version(format!("Model {}", model), schema).unwrap();
    }
    catalog
}

fn item(id: i64, name: &str) -> Record {
    let mut record = Record::new();
    record.insert("id".into(), Value::Integer(id));
    record.insert("name".into(), Value::Text(name.into()));
    record
}

fn write_model_23_store(dir: &Path) -> std::path::PathBuf {
    let store = dir.join("app.store");
    let document = StoreDocument::new("Model 23").with_records("Item", vec![item(1, "first"), item(2, "second")]);
    save_document(&store, &document).unwrap();
    store
}

fn migrator() -> Migrator {
    Migrator::new(Arc::new(model_catalog()))
        .with_locks(Arc::new(StoreLocks::new()))
        .with_config(MigratorConfig::new().sync_writes(false))
}

/// Everything in `dir`, sorted by name.
fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_model_23_to_31_runs_eight_steps() {
    let dir = TempDir::new().unwrap();
    let store = write_model_23_store(dir.path());

    let steps = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&steps);
    let report = migrator()
        .with_observer(move |event| {
            if let MigrationEvent::StepCompleted { source_version, target_version, .. } = event {
                recorded
                    .lock()
                    .unwrap()
                    .push((source_version.to_string(), target_version.to_string()));
            }
        })
        .migrate(&store, &"Model 31".into())
        .unwrap();

    assert_eq!(report.steps_executed, 8);
    assert_eq!(report.outcome, MigrationOutcome::Committed);
    assert_eq!(report.source_version, SchemaVersion::new("Model 23"));
    assert_eq!(report.target_version, SchemaVersion::new("Model 31"));

    let steps = steps.lock().unwrap();
    assert_eq!(steps.len(), 8);
    assert_eq!(steps[0], ("Model 23".to_string(), "Model 24".to_string()));
    assert_eq!(steps[7], ("Model 30".to_string(), "Model 31".to_string()));

    let migrated = read_document(&store).unwrap();
    assert_eq!(migrated.schema_version, SchemaVersion::new("Model 31"));
    let items = migrated.records("Item");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["name"], Value::Text("first".into()));
    assert_eq!(items[1]["f31"], Value::Integer(0));

    // Only the store remains; the workspace is gone.
    assert_eq!(dir_entries(dir.path()), vec!["app.store".to_string()]);
}

#[test]
fn test_store_at_target_is_noop() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("app.store");
    save_document(&store, &StoreDocument::new("Model 31")).unwrap();
    let before = fs::read(&store).unwrap();

    let report = migrator().migrate(&store, &"Model 31".into()).unwrap();

    assert!(report.is_noop());
    assert_eq!(report.steps_executed, 0);
    assert_eq!(fs::read(&store).unwrap(), before);
}

#[test]
fn test_migrate_to_latest() {
    let dir = TempDir::new().unwrap();
    let store = write_model_23_store(dir.path());

    let report = migrator().migrate_to_latest(&store).unwrap();
    assert_eq!(report.target_version, SchemaVersion::new("Model 31"));
    assert_eq!(read_declared_version(&store).unwrap(), SchemaVersion::new("Model 31"));
}

#[test]
fn test_failure_at_step_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let store = write_model_23_store(dir.path());
    let before = fs::read(&store).unwrap();

    // Fourth step, "Model 26" -> "Model 27".
    let failing = MappingRule::new().with_entity(
        "Item",
        EntityMapping::new().with_record_hook(|_, _| Err(MigrateError::MappingError("injected failure".into()))),
    );
    let mappings = MappingRegistry::new().with_mapping("Model 26", "Model 27", failing).unwrap();

    let states = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&states);
    let err = migrator()
        .with_mappings(Arc::new(mappings))
        .with_observer(move |event| {
            if let MigrationEvent::StateChanged { to, .. } = event {
                recorded.lock().unwrap().push(*to);
            }
        })
        .migrate(&store, &"Model 31".into())
        .unwrap_err();

    match &err {
        MigrateError::StepMigrationFailed { index, source_version, target_version, .. } => {
            assert_eq!(*index, 3);
            assert_eq!(source_version, "Model 26");
            assert_eq!(target_version, "Model 27");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(err.failed_step(), Some(3));

    assert_eq!(fs::read(&store).unwrap(), before);
    assert_eq!(dir_entries(dir.path()), vec!["app.store".to_string()]);

    let states = states.lock().unwrap();
    assert_eq!(states.last(), Some(&MigrationState::RolledBack));
    assert!(states.contains(&MigrationState::Executing { step: 3, total: 8 }));
    assert!(!states.contains(&MigrationState::Executing { step: 4, total: 8 }));
}

#[test]
fn test_ambiguous_mapping_fails_before_writing() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("app.store");
    let mut record = Record::new();
    record.insert("qty".into(), Value::Text("7".into()));
    save_document(&store, &StoreDocument::new("v1").with_records("Stock", vec![record])).unwrap();
    let before = fs::read(&store).unwrap();

    let catalog = InMemoryCatalog::new()
        .with_version("v1", Schema::new(vec![EntityDef::new("Stock", vec![FieldDef::new("qty", DataType::Text)])]))
        .unwrap()
        .with_version("v2", Schema::new(vec![EntityDef::new("Stock", vec![FieldDef::new("qty", DataType::Integer)])]))
        .unwrap();
    let migrator = Migrator::new(Arc::new(catalog))
        .with_locks(Arc::new(StoreLocks::new()))
        .with_config(MigratorConfig::new().sync_writes(false));

    let err = migrator.migrate(&store, &"v2".into()).unwrap_err();
    assert_eq!(err.failed_step(), Some(0));
    assert_eq!(fs::read(&store).unwrap(), before);
    assert_eq!(dir_entries(dir.path()), vec!["app.store".to_string()]);

    // An explicit cast resolves the ambiguity.
    let cast = MappingRule::new().with_entity("Stock", EntityMapping::new().cast_field("qty", "qty"));
    let mappings = MappingRegistry::new().with_mapping("v1", "v2", cast).unwrap();
    migrator.with_mappings(Arc::new(mappings)).migrate(&store, &"v2".into()).unwrap();
    assert_eq!(read_document(&store).unwrap().records("Stock")[0]["qty"], Value::Integer(7));
}

#[test]
fn test_unknown_target_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let store = write_model_23_store(dir.path());
    let before = fs::read(&store).unwrap();

    let err = migrator().migrate(&store, &"Model 99".into()).unwrap_err();

    assert!(matches!(err, MigrateError::UnknownVersion(name) if name == "Model 99"));
    assert_eq!(fs::read(&store).unwrap(), before);
    assert_eq!(dir_entries(dir.path()), vec!["app.store".to_string()]);
}

#[test]
fn test_unregistered_store_version_is_unknown() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("app.store");
    save_document(&store, &StoreDocument::new("Model 7")).unwrap();

    let before = fs::read(&store).unwrap();

    let err = migrator().migrate(&store, &"Model 31".into()).unwrap_err();

    assert!(matches!(err, MigrateError::UnknownVersion(name) if name == "Model 7"));
    assert_eq!(fs::read(&store).unwrap(), before);
    assert_eq!(dir_entries(dir.path()), vec!["app.store".to_string()]);
}

#[test]
fn test_downgrade_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("app.store");
    save_document(&store, &StoreDocument::new("Model 30")).unwrap();
    let before = fs::read(&store).unwrap();

    let err = migrator().migrate(&store, &"Model 24".into()).unwrap_err();

    assert!(matches!(err, MigrateError::UnsupportedDowngrade { .. }));
    assert_eq!(fs::read(&store).unwrap(), before);
    assert_eq!(dir_entries(dir.path()), vec!["app.store".to_string()]);
}

#[test]
fn test_corrupt_store_is_unresolvable() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("app.store");
    fs::write(&store, b"definitely not a store").unwrap();

    let err = migrator().migrate(&store, &"Model 31".into()).unwrap_err();

    assert!(matches!(err, MigrateError::UnresolvableSourceVersion { .. }));
    assert_eq!(fs::read(&store).unwrap(), b"definitely not a store");
    assert_eq!(dir_entries(dir.path()), vec!["app.store".to_string()]);
}

#[test]
fn test_retained_backup_holds_original_bytes() {
    let dir = TempDir::new().unwrap();
    let store = write_model_23_store(dir.path());
    let before = fs::read(&store).unwrap();

    migrator()
        .with_config(MigratorConfig::new().sync_writes(false).retain_backup(true))
        .migrate(&store, &"Model 25".into())
        .unwrap();

    let backup = dir.path().join("app.store.backup-Model_23");
    assert_eq!(fs::read(&backup).unwrap(), before);
    assert_eq!(read_declared_version(&store).unwrap(), SchemaVersion::new("Model 25"));
}

#[test]
fn test_derived_field_reads_source_record() {
    let dir = TempDir::new().unwrap();
    let store = write_model_23_store(dir.path());

    // f24 = id * 100 + length of name
    let derive = MappingRule::new().with_entity(
        "Item",
        EntityMapping::new().derive_field("f24", |source| {
            let id = source.get("id").and_then(Value::as_i64).unwrap_or(0);
            let name_len = source.get("name").and_then(Value::as_str).map_or(0, str::len);
            Ok(Value::Integer(id * 100 + name_len as i64))
        }),
    );
    let mappings = MappingRegistry::new().with_mapping("Model 23", "Model 24", derive).unwrap();

    migrator()
        .with_mappings(Arc::new(mappings))
        .migrate(&store, &"Model 25".into())
        .unwrap();

    let items = read_document(&store).unwrap();
    let items = items.records("Item");
    assert_eq!(items[0]["f24"], Value::Integer(105));
    assert_eq!(items[1]["f24"], Value::Integer(206));
    assert_eq!(items[1]["f25"], Value::Integer(0));
}

#[cfg(unix)]
#[test]
fn test_commit_keeps_store_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let store = write_model_23_store(dir.path());
    fs::set_permissions(&store, fs::Permissions::from_mode(0o644)).unwrap();

    migrator().migrate(&store, &"Model 24".into()).unwrap();

    assert_eq!(read_declared_version(&store).unwrap(), SchemaVersion::new("Model 24"));
    assert_eq!(fs::metadata(&store).unwrap().permissions().mode() & 0o777, 0o644);
}
