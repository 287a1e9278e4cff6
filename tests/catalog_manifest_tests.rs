/// Catalog manifest tests
///
/// Loads a catalog and declarative mappings from JSON and migrates a store with them.
/// Run with: cargo test --test catalog_manifest_tests

use std::fs;
use std::sync::Arc;
use storemigrator::{
    MigrateError, Migrator, MigratorConfig, Record, SchemaCatalog, StoreDocument, StoreLocks, Value,
    load_manifest, read_document, save_document,
};
use tempfile::TempDir;

const MANIFEST: &str = r#"{
    "ordering": "natural_name",
    "versions": [
        { "name": "Model 10", "schema_file": "schemas/model-10.json" },
        { "name": "Model 9", "schema": { "entities": [
            { "name": "Client", "fields": [
                { "name": "id", "data_type": "integer", "nullable": false },
                { "name": "mail", "data_type": "text" },
                { "name": "age", "data_type": "text" }
            ] }
        ] } }
    ],
    "mappings": [
        { "source": "Model 9", "target": "Model 10",
          "entities": { "Customer": { "from_entity": "Client", "fields": {
              "email": { "copy_from": "mail" },
              "age": { "cast_from": "age" },
              "tier": { "constant": "basic" }
          } } } }
    ]
}"#;

const MODEL_10: &str = r#"{ "entities": [
    { "name": "Customer", "fields": [
        { "name": "id", "data_type": "integer", "nullable": false },
        { "name": "email", "data_type": "text" },
        { "name": "age", "data_type": "integer" },
        { "name": "tier", "data_type": "text", "nullable": false },
        { "name": "score", "data_type": "float", "default": 1.5 }
    ] }
] }"#;

fn write_manifest(dir: &TempDir) -> std::path::PathBuf {
    fs::create_dir(dir.path().join("schemas")).unwrap();
    fs::write(dir.path().join("schemas/model-10.json"), MODEL_10).unwrap();
    let path = dir.path().join("catalog.json");
    fs::write(&path, MANIFEST).unwrap();
    path
}

#[test]
fn test_natural_ordering_puts_model_9_first() {
    let dir = TempDir::new().unwrap();
    let loaded = load_manifest(&write_manifest(&dir)).unwrap();

    let names: Vec<String> = loaded
        .catalog
        .ordered_versions()
        .iter()
        .map(|version| version.to_string())
        .collect();
    assert_eq!(names, vec!["Model 9", "Model 10"]);
    assert_eq!(loaded.mappings.len(), 1);
}

#[test]
fn test_declarative_mapping_migrates_store() {
    let dir = TempDir::new().unwrap();
    let loaded = load_manifest(&write_manifest(&dir)).unwrap();

    let mut client = Record::new();
    client.insert("id".into(), Value::Integer(7));
    client.insert("mail".into(), Value::Text("a@example.com".into()));
    client.insert("age".into(), Value::Text("41".into()));
    let store = dir.path().join("crm.store");
    save_document(&store, &StoreDocument::new("Model 9").with_records("Client", vec![client])).unwrap();

    let report = Migrator::new(Arc::new(loaded.catalog))
        .with_mappings(Arc::new(loaded.mappings))
        .with_locks(Arc::new(StoreLocks::new()))
        .with_config(MigratorConfig::new().sync_writes(false))
        .migrate_to_latest(&store)
        .unwrap();
    assert_eq!(report.steps_executed, 1);

    let migrated = read_document(&store).unwrap();
    assert!(migrated.records("Client").is_empty());
    let customer = &migrated.records("Customer")[0];
    assert_eq!(customer["id"], Value::Integer(7));
    assert_eq!(customer["email"], Value::Text("a@example.com".into()));
    assert_eq!(customer["age"], Value::Integer(41));
    assert_eq!(customer["tier"], Value::Text("basic".into()));
    assert_eq!(customer["score"], Value::Float(1.5));
}

#[test]
fn test_mapping_for_unknown_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_manifest(&dir);
    let broken = MANIFEST.replace(r#""source": "Model 9""#, r#""source": "Model 8""#);
    fs::write(&path, broken).unwrap();

    let err = load_manifest(&path).unwrap_err();
    assert!(matches!(err, MigrateError::UnknownVersion(name) if name == "Model 8"));
}
