use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use tracing::{Level, event};
use uuid::Uuid;
use crate::catalog::SchemaVersion;

/// Lifecycle of one migration run.
///
/// ```text
/// NotStarted -> Planning -> NoOp
///                        -> Executing{0..n} -> Committed
///                        \-> RolledBack  <---/
/// ```
///
/// `NoOp`, `Committed` and `RolledBack` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationState {
    NotStarted,
    Planning,
    NoOp,
    Executing { step: usize, total: usize },
    Committed,
    RolledBack,
}

impl MigrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NoOp | Self::Committed | Self::RolledBack)
    }

    pub fn can_transition_to(&self, next: &MigrationState) -> bool {
        use MigrationState::*;
        match (self, next) {
            (NotStarted, Planning) => true,
            (Planning, NoOp) | (Planning, RolledBack) => true,
            (Planning, Executing { step: 0, total }) => *total > 0,
            (Executing { step, total }, Executing { step: next, total: next_total }) => {
                total == next_total && *next == step + 1 && next < total
            }
            (Executing { step, total }, Committed) => step + 1 == *total,
            (Executing { .. }, RolledBack) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Planning => write!(f, "planning"),
            Self::NoOp => write!(f, "no-op"),
            Self::Executing { step, total } => write!(f, "executing step {}/{}", step + 1, total),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Progress notifications delivered to a `MigrationObserver`.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationEvent {
    StateChanged {
        run_id: Uuid,
        from: MigrationState,
        to: MigrationState,
    },
    StepCompleted {
        run_id: Uuid,
        index: usize,
        source_version: SchemaVersion,
        target_version: SchemaVersion,
        record_count: usize,
    },
}

/// Called synchronously on the migrating thread; a slow observer slows the run.
pub type MigrationObserver = Arc<dyn Fn(&MigrationEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// Store was already at the target version; nothing was written.
    NoOp,
    Committed,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub store_path: PathBuf,
    pub source_version: SchemaVersion,
    pub target_version: SchemaVersion,
    pub steps_executed: usize,
    pub outcome: MigrationOutcome,
    pub elapsed: Duration,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.outcome == MigrationOutcome::NoOp
    }
}

/// Drives a run's state machine and fans transitions out to the observer.
pub(crate) struct RunTracker {
    run_id: Uuid,
    state: MigrationState,
    observer: Option<MigrationObserver>,
}

impl RunTracker {
    pub(crate) fn new(run_id: Uuid, observer: Option<MigrationObserver>) -> Self {
        Self {
            run_id,
            state: MigrationState::NotStarted,
            observer,
        }
    }

    pub(crate) fn state(&self) -> MigrationState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: MigrationState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal migration transition {:?} -> {:?}",
            self.state,
            next
        );
        let from = std::mem::replace(&mut self.state, next);
        event!(Level::DEBUG, %from, to = %next, "migration state changed");
        self.notify(MigrationEvent::StateChanged {
            run_id: self.run_id,
            from,
            to: next,
        });
    }

    /// Moves to `RolledBack` unless the run already finished.
    pub(crate) fn fail(&mut self) {
        if !self.state.is_terminal() {
            if self.state == MigrationState::NotStarted {
                self.advance(MigrationState::Planning);
            }
            self.advance(MigrationState::RolledBack);
        }
    }

    pub(crate) fn step_completed(
        &self,
        index: usize,
        source_version: &SchemaVersion,
        target_version: &SchemaVersion,
        record_count: usize,
    ) {
        self.notify(MigrationEvent::StepCompleted {
            run_id: self.run_id,
            index,
            source_version: source_version.clone(),
            target_version: target_version.clone(),
            record_count,
        });
    }

    fn notify(&self, event: MigrationEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }
}
