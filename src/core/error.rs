use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Unknown schema version '{0}'")]
    UnknownVersion(String),

    #[error("Cannot determine schema version of store '{}': {reason}", .path.display())]
    UnresolvableSourceVersion { path: PathBuf, reason: String },

    #[error("Downgrade from '{from}' to '{to}' is not supported")]
    UnsupportedDowngrade { from: String, to: String },

    #[error("Migration step {index} ('{source_version}' -> '{target_version}') failed: {cause}")]
    StepMigrationFailed {
        index: usize,
        source_version: String,
        target_version: String,
        #[source]
        cause: Box<MigrateError>,
    },

    #[error("Mapping error: {0}")]
    MappingError(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid migration plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Store format error: {0}")]
    FormatError(String),

    #[error("Store '{}' is already being migrated", .0.display())]
    StoreBusy(PathBuf),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, MigrateError>;

impl MigrateError {
    /// Index of the failed step, if this error came out of plan execution.
    pub fn failed_step(&self) -> Option<usize> {
        match self {
            Self::StepMigrationFailed { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub(crate) fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Self::IoError(format!("{}: {}", context, err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for MigrateError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
