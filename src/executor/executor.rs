use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{Level, event};
use crate::catalog::SchemaVersion;
use crate::core::{MigrateError, Result};
use crate::mapping::{MappingProvider, MappingRegistry, StepTransform, infer_transform};
use crate::planner::MigrationStep;
use crate::storage::{MigrationWorkspace, StoreDocument, read_document, write_document};
use super::transform::apply_transform;

/// Output of one executed step: a new store file inside the workspace.
///
/// Dropping the artifact deletes the file.
#[derive(Debug)]
pub struct StepArtifact {
    pub version: SchemaVersion,
    pub path: TempPath,
    pub record_count: usize,
}

/// Applies single migration steps. Never writes to its input.
#[derive(Clone)]
pub struct StepExecutor {
    mappings: Arc<dyn MappingProvider>,
}

impl Default for StepExecutor {
    fn default() -> Self {
        Self::new(Arc::new(MappingRegistry::new()))
    }
}

impl StepExecutor {
    pub fn new(mappings: Arc<dyn MappingProvider>) -> Self {
        Self { mappings }
    }

    /// Resolves the step's field mapping without touching any store.
    pub fn prepare(&self, step: &MigrationStep) -> Result<StepTransform> {
        let rule = self.mappings.mapping(&step.source_version, &step.target_version);
        infer_transform(&step.source_schema, &step.target_schema, rule.as_deref())
    }

    pub fn apply(&self, step: &MigrationStep, input: &Path, workspace: &MigrationWorkspace) -> Result<StepArtifact> {
        let transform = self.prepare(step)?;

        let document = read_document(input)?;
        if document.schema_version != step.source_version {
            return Err(MigrateError::SchemaViolation(format!(
                "Input store declares '{}' but the step expects '{}'",
                document.schema_version, step.source_version
            )));
        }

        if !transform.dropped_entities.is_empty() {
            event!(
                Level::DEBUG,
                dropped = ?transform.dropped_entities,
                "entities absent from target schema are dropped"
            );
        }

        let output = StoreDocument {
            schema_version: step.target_version.clone(),
            entities: apply_transform(&transform, &step.source_schema, &document.entities)?,
        };

        let mut artifact = workspace.new_artifact(&artifact_label(&step.target_version))?;
        write_document(artifact.as_file_mut(), &output)?;
        if workspace.sync_writes() {
            artifact
                .as_file()
                .sync_all()
                .map_err(|e| MigrateError::io("Failed to sync step artifact", e))?;
        }

        Ok(StepArtifact {
            version: output.schema_version.clone(),
            path: artifact.into_temp_path(),
            record_count: output.record_count(),
        })
    }
}

fn artifact_label(version: &SchemaVersion) -> String {
    let safe: String = version
        .name()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("step-{}", safe)
}
