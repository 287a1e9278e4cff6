//! Migration runs: locking, staging, commit and rollback.

pub mod config;
pub mod lock;
pub mod migrator;
pub mod state;

pub use config::{LockPolicy, MigratorConfig};
pub use lock::{StoreLockGuard, StoreLocks};
pub use migrator::{Migrator, migrate};
pub use state::{MigrationEvent, MigrationObserver, MigrationOutcome, MigrationReport, MigrationState};
