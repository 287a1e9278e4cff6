use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{Level, event, info_span};
use uuid::Uuid;
use super::lock::StoreLocks;
use super::state::{MigrationEvent, MigrationObserver, MigrationOutcome, MigrationReport, MigrationState, RunTracker};
use super::MigratorConfig;
use crate::catalog::{SchemaCatalog, SchemaVersion};
use crate::core::{MigrateError, Result};
use crate::executor::{StepArtifact, StepExecutor};
use crate::mapping::{MappingProvider, MappingRegistry};
use crate::planner::{MigrationPlan, MigrationStep, StepPlanner};
use crate::storage::{MigrationWorkspace, read_declared_version, read_header};

/// Brings stores up to a target schema version.
///
/// A run either commits the store at the target version or leaves the
/// original file byte-for-byte as it was.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use storemigrator::{InMemoryCatalog, Migrator, Schema};
///
/// # fn main() -> storemigrator::Result<()> {
/// let catalog = InMemoryCatalog::new()
///     .with_version("Model 1", Schema::default())?
///     .with_version("Model 2", Schema::default())?;
///
/// let report = Migrator::new(Arc::new(catalog))
///     .migrate(Path::new("app.store"), &"Model 2".into())?;
/// println!("{} steps", report.steps_executed);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Migrator {
    catalog: Arc<dyn SchemaCatalog>,
    executor: StepExecutor,
    config: MigratorConfig,
    locks: Arc<StoreLocks>,
    observer: Option<MigrationObserver>,
}

impl Migrator {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self {
            catalog,
            executor: StepExecutor::new(Arc::new(MappingRegistry::new())),
            config: MigratorConfig::default(),
            locks: StoreLocks::global(),
            observer: None,
        }
    }

    pub fn with_mappings(mut self, mappings: Arc<dyn MappingProvider>) -> Self {
        self.executor = StepExecutor::new(mappings);
        self
    }

    pub fn with_config(mut self, config: MigratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&MigrationEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Use a private lock registry instead of the process-wide one.
    pub fn with_locks(mut self, locks: Arc<StoreLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        &self.catalog
    }

    /// Plans a migration between two catalog versions without touching any store.
    pub fn plan(&self, source: &SchemaVersion, target: &SchemaVersion) -> Result<MigrationPlan> {
        StepPlanner::new(self.catalog.as_ref()).plan(source, target)
    }

    /// Plans the migration `store_path` would need to reach `target`.
    pub fn plan_for_store(&self, store_path: &Path, target: &SchemaVersion) -> Result<MigrationPlan> {
        let source = read_declared_version(store_path)?;
        self.catalog.schema(&source)?;
        self.plan(&source, target)
    }

    /// Migrates to the newest version in the catalog.
    pub fn migrate_to_latest(&self, store_path: impl AsRef<Path>) -> Result<MigrationReport> {
        let latest = self
            .catalog
            .ordered_versions()
            .last()
            .cloned()
            .ok_or_else(|| MigrateError::InvalidCatalog("Catalog has no versions".into()))?;
        self.migrate(store_path, &latest)
    }

    pub fn migrate(&self, store_path: impl AsRef<Path>, target: &SchemaVersion) -> Result<MigrationReport> {
        let store_path = store_path.as_ref();
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        let span = info_span!(
            "migration.run",
            run_id = %run_id,
            store = %store_path.display(),
            target = %target
        );
        let _enter = span.enter();

        let mut run = RunTracker::new(run_id, self.observer.clone());
        run.advance(MigrationState::Planning);

        match self.run(&mut run, store_path, target) {
            Ok((store_path, source_version, steps_executed, outcome)) => {
                let report = MigrationReport {
                    run_id,
                    store_path,
                    source_version,
                    target_version: target.clone(),
                    steps_executed,
                    outcome,
                    elapsed: started.elapsed(),
                };
                event!(
                    Level::INFO,
                    source = %report.source_version,
                    steps = report.steps_executed,
                    outcome = ?report.outcome,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "migration finished"
                );
                Ok(report)
            }
            Err(err) => {
                event!(Level::ERROR, state = %run.state(), error = %err, "migration rolled back");
                run.fail();
                Err(err)
            }
        }
    }

    /// Runs `migrate` on the blocking pool. Must be called inside a Tokio runtime.
    ///
    /// Once dispatched the run cannot be cancelled; aborting the handle only
    /// detaches it.
    pub fn spawn_migrate(
        self: &Arc<Self>,
        store_path: impl Into<PathBuf>,
        target: SchemaVersion,
    ) -> JoinHandle<Result<MigrationReport>> {
        let migrator = Arc::clone(self);
        let store_path = store_path.into();
        tokio::task::spawn_blocking(move || migrator.migrate(&store_path, &target))
    }

    fn run(
        &self,
        run: &mut RunTracker,
        store_path: &Path,
        target: &SchemaVersion,
    ) -> Result<(PathBuf, SchemaVersion, usize, MigrationOutcome)> {
        let store_path = fs::canonicalize(store_path).map_err(|e| MigrateError::UnresolvableSourceVersion {
            path: store_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let _guard = self.locks.acquire(&store_path, self.config.lock_policy)?;

        let source = read_declared_version(&store_path)?;
        self.catalog.schema(&source)?;
        let plan = self.plan(&source, target)?;

        if plan.is_empty() {
            run.advance(MigrationState::NoOp);
            return Ok((store_path, source, 0, MigrationOutcome::NoOp));
        }

        // Every step's mapping must resolve before anything is written.
        for (index, step) in plan.iter().enumerate() {
            self.executor
                .prepare(step)
                .map_err(|cause| step_failure(index, step, cause))?;
        }

        let mut workspace = MigrationWorkspace::create(
            &store_path,
            &self.config.workspace_prefix,
            self.config.sync_writes,
        )?;

        let outcome = workspace
            .take_backup()
            .and_then(|backup| self.execute(run, &plan, &backup, &workspace));
        let artifact = match outcome {
            Ok(artifact) => artifact,
            Err(err) => {
                workspace.discard();
                return Err(err);
            }
        };

        let retain_as = self
            .config
            .retain_backup
            .then(|| backup_destination(&store_path, &source));
        workspace.commit(artifact.path, retain_as)?;
        run.advance(MigrationState::Committed);

        Ok((store_path, source, plan.len(), MigrationOutcome::Committed))
    }

    /// Executes every step, each reading the previous step's artifact.
    fn execute(
        &self,
        run: &mut RunTracker,
        plan: &MigrationPlan,
        backup: &Path,
        workspace: &MigrationWorkspace,
    ) -> Result<StepArtifact> {
        let total = plan.len();
        let mut current: Option<StepArtifact> = None;

        for (index, step) in plan.iter().enumerate() {
            run.advance(MigrationState::Executing { step: index, total });
            let _step_span = info_span!(
                "migration.step",
                index,
                from = %step.source_version,
                to = %step.target_version
            )
            .entered();

            let input = current.as_ref().map(|artifact| &*artifact.path).unwrap_or(backup);
            let artifact = self
                .executor
                .apply(step, input, workspace)
                .map_err(|cause| step_failure(index, step, cause))?;

            event!(Level::DEBUG, records = artifact.record_count, "step artifact written");
            run.step_completed(index, &step.source_version, &step.target_version, artifact.record_count);
            // Replacing the previous artifact deletes its file.
            current = Some(artifact);
        }

        let artifact = current.ok_or_else(|| MigrateError::InvalidPlan("Plan produced no output".into()))?;
        if self.config.verify_output {
            let header = read_header(&artifact.path)?;
            if header.schema_version != *plan.target() {
                return Err(MigrateError::SchemaViolation(format!(
                    "Final artifact declares '{}' instead of '{}'",
                    header.schema_version,
                    plan.target()
                )));
            }
        }
        Ok(artifact)
    }
}

/// One-shot migration with the default configuration.
pub fn migrate(
    store_path: impl AsRef<Path>,
    target: &SchemaVersion,
    catalog: Arc<dyn SchemaCatalog>,
) -> Result<MigrationReport> {
    Migrator::new(catalog).migrate(store_path, target)
}

fn step_failure(index: usize, step: &MigrationStep, cause: MigrateError) -> MigrateError {
    MigrateError::StepMigrationFailed {
        index,
        source_version: step.source_version.to_string(),
        target_version: step.target_version.to_string(),
        cause: Box::new(cause),
    }
}

/// `<store>.backup-<source version>` beside the store.
fn backup_destination(store_path: &Path, source: &SchemaVersion) -> PathBuf {
    let version: String = source
        .name()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    let mut name = store_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".backup-{}", version));
    store_path.with_file_name(name)
}
