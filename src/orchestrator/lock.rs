use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;
use lazy_static::lazy_static;
use super::LockPolicy;
use crate::core::{MigrateError, Result};

lazy_static! {
    static ref GLOBAL_STORE_LOCKS: Arc<StoreLocks> = Arc::new(StoreLocks::new());
}

/// Per-location exclusion for in-flight migrations.
///
/// Keys are expected to be canonical paths so that two spellings of the same
/// store map to one lock. Exclusion is in-process only.
#[derive(Debug, Default)]
pub struct StoreLocks {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

impl StoreLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by every `Migrator` in the process unless one is
    /// given its own.
    pub fn global() -> Arc<StoreLocks> {
        Arc::clone(&GLOBAL_STORE_LOCKS)
    }

    pub fn acquire(self: &Arc<Self>, path: &Path, policy: LockPolicy) -> Result<StoreLockGuard> {
        let mut held = self.held.lock()?;
        let deadline = match policy {
            LockPolicy::Wait { timeout: Some(timeout) } => Some(Instant::now() + timeout),
            _ => None,
        };

        while held.contains(path) {
            match (policy, deadline) {
                (LockPolicy::Reject, _) => return Err(MigrateError::StoreBusy(path.to_path_buf())),
                (LockPolicy::Wait { .. }, None) => {
                    held = self.released.wait(held)?;
                }
                (LockPolicy::Wait { .. }, Some(deadline)) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(MigrateError::StoreBusy(path.to_path_buf()));
                    }
                    held = self.released.wait_timeout(held, remaining)?.0;
                }
            }
        }

        held.insert(path.to_path_buf());
        Ok(StoreLockGuard {
            locks: Arc::clone(self),
            path: path.to_path_buf(),
        })
    }
}

/// Releases the store's lock on drop.
#[derive(Debug)]
pub struct StoreLockGuard {
    locks: Arc<StoreLocks>,
    path: PathBuf,
}

impl StoreLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLockGuard {
    fn drop(&mut self) {
        let mut held = match self.locks.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        held.remove(&self.path);
        drop(held);
        self.locks.released.notify_all();
    }
}
