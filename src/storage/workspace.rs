//! Scratch space for one migration run.
//!
//! The workspace is a hidden temporary directory next to the store, so every
//! artifact lives on the store's filesystem and the final rename is atomic.
//! Dropping the workspace deletes whatever is still inside it.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir, TempPath};
use crate::core::{MigrateError, Result};

pub struct MigrationWorkspace {
    dir: TempDir,
    store_path: PathBuf,
    backup_path: Option<PathBuf>,
    sync_writes: bool,
}

impl MigrationWorkspace {
    pub fn create(store_path: &Path, prefix: &str, sync_writes: bool) -> Result<Self> {
        let parent = store_dir(store_path);
        let store_name = store_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());

        let dir = tempfile::Builder::new()
            .prefix(&format!(".{}{}", store_name, prefix))
            .tempdir_in(parent)
            .map_err(|e| {
                MigrateError::io(format!("Failed to create migration workspace in '{}'", parent.display()), e)
            })?;

        Ok(Self {
            dir,
            store_path: store_path.to_path_buf(),
            backup_path: None,
            sync_writes,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn sync_writes(&self) -> bool {
        self.sync_writes
    }

    /// Copies the store into the workspace and marks the copy read-only.
    /// The original file is only read.
    pub fn take_backup(&mut self) -> Result<PathBuf> {
        let backup_path = self.dir.path().join("backup.store");
        fs::copy(&self.store_path, &backup_path).map_err(|e| {
            MigrateError::io(format!("Failed to back up store '{}'", self.store_path.display()), e)
        })?;

        let mut permissions = fs::metadata(&backup_path)
            .map_err(|e| MigrateError::io("Failed to stat backup", e))?
            .permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&backup_path, permissions)
            .map_err(|e| MigrateError::io("Failed to mark backup read-only", e))?;

        self.backup_path = Some(backup_path.clone());
        Ok(backup_path)
    }

    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_path.as_deref()
    }

    /// Fresh, uniquely named artifact file inside the workspace.
    pub fn new_artifact(&self, label: &str) -> Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(&format!("{}-", label))
            .suffix(".store")
            .tempfile_in(self.dir.path())
            .map_err(|e| MigrateError::io("Failed to create step artifact", e))
    }

    /// Renames `artifact` over the store path, optionally keeps the backup
    /// beside the store, then removes the workspace.
    pub fn commit(self, artifact: TempPath, retain_backup_as: Option<PathBuf>) -> Result<()> {
        // The artifact was created 0600; the store keeps its own mode.
        let permissions = fs::metadata(&self.store_path)
            .map_err(|e| MigrateError::io(format!("Failed to stat store '{}'", self.store_path.display()), e))?
            .permissions();
        fs::set_permissions(&artifact, permissions)
            .map_err(|e| MigrateError::io("Failed to apply store permissions to artifact", e))?;

        artifact.persist(&self.store_path).map_err(|e| {
            MigrateError::io(
                format!("Failed to replace store '{}'", self.store_path.display()),
                e.error,
            )
        })?;

        if self.sync_writes {
            sync_dir(store_dir(&self.store_path));
        }

        if let (Some(backup), Some(destination)) = (self.backup_path.as_ref(), retain_backup_as) {
            if let Err(err) = fs::rename(backup, &destination) {
                log::warn!(
                    "store committed but backup could not be kept at '{}': {}",
                    destination.display(),
                    err
                );
            }
        }

        self.discard();
        Ok(())
    }

    /// Removes the workspace and everything in it. Failures are logged only:
    /// by this point the store itself is already in its final state.
    pub fn discard(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            log::warn!("failed to remove migration workspace '{}': {}", path.display(), err);
        }
    }
}

fn store_dir(store_path: &Path) -> &Path {
    match store_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(err) = fs::File::open(dir).and_then(|file| file.sync_all()) {
        log::warn!("failed to sync directory '{}': {}", dir.display(), err);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
