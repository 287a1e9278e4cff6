use crate::catalog::{SchemaCatalog, SchemaVersion, VersionResolver};
use crate::core::{MigrateError, Result};
use super::{MigrationPlan, MigrationStep};

/// Builds migration plans from a catalog snapshot.
///
/// Pure: no I/O, no side effects. Every plan covers each registered version
/// between `source` and `target` exactly once, in catalog order.
pub struct StepPlanner<'a> {
    catalog: &'a dyn SchemaCatalog,
}

impl<'a> StepPlanner<'a> {
    pub fn new(catalog: &'a dyn SchemaCatalog) -> Self {
        Self { catalog }
    }

    pub fn plan(&self, source: &SchemaVersion, target: &SchemaVersion) -> Result<MigrationPlan> {
        let resolver = VersionResolver::new(self.catalog)?;
        let source_position = resolver.index_of(source)?;
        let target_position = resolver.index_of(target)?;

        if source_position == target_position {
            return Ok(MigrationPlan::empty(source.clone()));
        }

        if target_position < source_position {
            return Err(MigrateError::UnsupportedDowngrade {
                from: source.to_string(),
                to: target.to_string(),
            });
        }

        let mut steps = Vec::with_capacity(target_position - source_position);
        let mut current_version = source.clone();
        let mut current_schema = self.catalog.schema(source)?;

        for position in source_position + 1..=target_position {
            let next_version = resolver.version_at(position).cloned().ok_or_else(|| {
                MigrateError::InvalidCatalog(format!("No schema version at position {}", position))
            })?;
            let next_schema = self.catalog.schema(&next_version)?;

            steps.push(MigrationStep::new(
                current_version,
                current_schema,
                next_version.clone(),
                next_schema.clone(),
            ));

            current_version = next_version;
            current_schema = next_schema;
        }

        MigrationPlan::new(source.clone(), target.clone(), steps)
    }
}

/// Shorthand for `StepPlanner::new(catalog).plan(source, target)`.
pub fn plan(catalog: &dyn SchemaCatalog, source: &SchemaVersion, target: &SchemaVersion) -> Result<MigrationPlan> {
    StepPlanner::new(catalog).plan(source, target)
}
