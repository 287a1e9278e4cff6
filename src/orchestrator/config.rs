use std::time::Duration;

/// What a migration does when another run already holds the same store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockPolicy {
    /// Fail immediately with `StoreBusy`.
    #[default]
    Reject,
    /// Block until the other run finishes; `None` waits indefinitely.
    Wait { timeout: Option<Duration> },
}

/// Migrator configuration
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use storemigrator::{LockPolicy, MigratorConfig};
///
/// let config = MigratorConfig::new()
///     .lock_policy(LockPolicy::Wait { timeout: Some(Duration::from_secs(30)) })
///     .retain_backup(true);
/// assert!(config.retain_backup);
/// ```
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// Behaviour on a concurrent run against the same store
    pub lock_policy: LockPolicy,

    /// fsync step artifacts and the store directory after commit
    pub sync_writes: bool,

    /// Keep the pre-migration copy beside the store after a successful commit
    pub retain_backup: bool,

    /// Re-read the final artifact's header before committing it
    pub verify_output: bool,

    /// Name fragment of the hidden workspace directory created next to the store
    pub workspace_prefix: String,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            lock_policy: LockPolicy::Reject,
            sync_writes: true,
            retain_backup: false,
            verify_output: true,
            workspace_prefix: ".migrate-".to_string(),
        }
    }
}

impl MigratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lock policy
    pub fn lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    /// Enable or disable fsync
    pub fn sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }

    /// Keep the backup after commit
    pub fn retain_backup(mut self, enabled: bool) -> Self {
        self.retain_backup = enabled;
        self
    }

    /// Enable or disable output verification
    pub fn verify_output(mut self, enabled: bool) -> Self {
        self.verify_output = enabled;
        self
    }

    /// Set the workspace directory prefix
    pub fn workspace_prefix(mut self, prefix: &str) -> Self {
        self.workspace_prefix = prefix.to_string();
        self
    }
}
