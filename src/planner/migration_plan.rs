use std::sync::Arc;
use crate::catalog::SchemaVersion;
use crate::core::{MigrateError, Result, Schema};

/// Transform between one version and its immediate catalog successor.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStep {
    pub source_version: SchemaVersion,
    pub source_schema: Arc<Schema>,
    pub target_version: SchemaVersion,
    pub target_schema: Arc<Schema>,
}

impl MigrationStep {
    pub fn new(
        source_version: SchemaVersion,
        source_schema: Arc<Schema>,
        target_version: SchemaVersion,
        target_schema: Arc<Schema>,
    ) -> Self {
        Self {
            source_version,
            source_schema,
            target_version,
            target_schema,
        }
    }
}

/// Ordered, contiguous chain of steps from `source` to `target`.
///
/// Created fresh per request; an empty plan means `source == target`.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    source: SchemaVersion,
    target: SchemaVersion,
    steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    /// Plan that does nothing for a store already at `version`.
    pub fn empty(version: SchemaVersion) -> Self {
        Self {
            source: version.clone(),
            target: version,
            steps: Vec::new(),
        }
    }

    /// Wraps `steps`, checking endpoints and contiguity.
    pub fn new(source: SchemaVersion, target: SchemaVersion, steps: Vec<MigrationStep>) -> Result<Self> {
        let plan = Self { source, target, steps };
        plan.validate()?;
        Ok(plan)
    }

    pub fn source(&self) -> &SchemaVersion {
        &self.source
    }

    pub fn target(&self) -> &SchemaVersion {
        &self.target
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MigrationStep> {
        self.steps.iter()
    }

    /// Checks the plan's structural invariants:
    /// - an empty plan has `source == target`,
    /// - the first step starts at `source`, the last ends at `target`,
    /// - each step starts where the previous one ended.
    pub fn validate(&self) -> Result<()> {
        let (Some(first), Some(last)) = (self.steps.first(), self.steps.last()) else {
            if self.source != self.target {
                return Err(MigrateError::InvalidPlan(format!(
                    "Empty migration plan cannot connect '{}' to '{}'",
                    self.source, self.target
                )));
            }
            return Ok(());
        };

        if first.source_version != self.source {
            return Err(MigrateError::InvalidPlan(format!(
                "Migration plan starts at '{}' instead of '{}'",
                first.source_version, self.source
            )));
        }
        if last.target_version != self.target {
            return Err(MigrateError::InvalidPlan(format!(
                "Migration plan ends at '{}' instead of '{}'",
                last.target_version, self.target
            )));
        }

        for pair in self.steps.windows(2) {
            if pair[0].target_version != pair[1].source_version {
                return Err(MigrateError::InvalidPlan(format!(
                    "Migration plan is not contiguous: '{}' is followed by a step from '{}'",
                    pair[0].target_version, pair[1].source_version
                )));
            }
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a MigrationPlan {
    type Item = &'a MigrationStep;
    type IntoIter = std::slice::Iter<'a, MigrationStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

impl IntoIterator for MigrationPlan {
    type Item = MigrationStep;
    type IntoIter = std::vec::IntoIter<MigrationStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}
