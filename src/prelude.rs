//! Recommended imports grouped by abstraction level.
//!
//! `app` covers what an application needs to migrate its store on startup.
//! `advanced` exposes the building blocks for custom catalogs and tooling.

pub mod app {
    //! Catalog, mappings and the migrator.
    pub use crate::{
        DataType, EntityDef, EntityMapping, FieldDef, FieldRule, InMemoryCatalog, MappingRegistry,
        MappingRule, MigrateError, MigrationReport, Migrator, MigratorConfig, Result, Schema,
        SchemaVersion, Value, load_manifest,
    };
}

pub mod advanced {
    //! Planner, executor and store-format internals.
    pub use crate::executor::{StepArtifact, StepExecutor, apply_transform};
    pub use crate::mapping::{StepTransform, infer_transform};
    pub use crate::orchestrator::{LockPolicy, MigrationEvent, MigrationState, StoreLocks};
    pub use crate::planner::{MigrationPlan, MigrationStep, StepPlanner};
    pub use crate::storage::{MigrationWorkspace, StoreDocument, StoreHeader, read_header};
}
