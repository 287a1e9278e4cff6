// ============================================================================
// Store Migrator Library
// ============================================================================

pub mod core;
pub mod catalog;
pub mod mapping;
pub mod planner;
pub mod storage;
pub mod executor;
pub mod orchestrator;
pub mod prelude;

// Re-export main types for convenience
pub use core::{DataType, EntityDef, FieldDef, MigrateError, Record, Result, Schema, Value};
pub use catalog::{
    InMemoryCatalog, LoadedManifest, SchemaCatalog, SchemaVersion, VersionOrdering, VersionResolver,
    load_manifest,
};
pub use mapping::{
    EntityMapping, FieldRule, MappingProvider, MappingRegistry, MappingRule, MappingSpec,
    registry_from_specs,
};
pub use planner::{MigrationPlan, MigrationStep, StepPlanner, plan};
pub use storage::{StoreDocument, StoreHeader, read_declared_version, read_document, save_document};
pub use executor::{StepArtifact, StepExecutor};
pub use orchestrator::{
    LockPolicy, MigrationEvent, MigrationObserver, MigrationOutcome, MigrationReport, MigrationState,
    Migrator, MigratorConfig, StoreLocks, migrate,
};
