//! Registry of known schema versions, ordered oldest to newest.

pub mod manifest;
pub mod ordering;
pub mod resolver;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::core::{MigrateError, Result, Schema};

pub use manifest::{CatalogManifest, LoadedManifest, load_manifest};
pub use ordering::{VersionOrdering, natural_cmp};
pub use resolver::VersionResolver;

/// A named point in the catalog's order.
///
/// Deliberately not `Ord`: two versions only compare through their catalog
/// positions, never by their names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(String);

impl SchemaVersion {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemaVersion {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SchemaVersion {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Source of schema versions and their descriptors.
///
/// Implementations must be read-only for the duration of a migration run.
pub trait SchemaCatalog: Send + Sync {
    /// All registered versions, oldest first.
    fn ordered_versions(&self) -> &[SchemaVersion];

    /// Schema registered for `version`, or `UnknownVersion`.
    fn schema(&self, version: &SchemaVersion) -> Result<Arc<Schema>>;
}

/// Immutable catalog held in memory.
///
/// Cloning is cheap; `with_version` produces a new catalog and leaves the
/// original untouched, so a snapshot handed to a running migration never changes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    versions: Arc<Vec<SchemaVersion>>,
    schemas: Arc<HashMap<SchemaVersion, Arc<Schema>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `version` as the newest entry of a new catalog.
    pub fn with_version(self, version: impl Into<SchemaVersion>, schema: Schema) -> Result<Self> {
        let version = version.into();
        if self.schemas.contains_key(&version) {
            return Err(MigrateError::InvalidCatalog(format!(
                "Schema version '{}' is registered twice",
                version
            )));
        }
        for entity in &schema.entities {
            for field in &entity.fields {
                if let Some(default) = &field.default {
                    field.validate(default).map_err(|err| {
                        MigrateError::InvalidCatalog(format!(
                            "Version '{}' entity '{}': bad default for field '{}': {}",
                            version, entity.name, field.name, err
                        ))
                    })?;
                }
            }
        }

        let mut versions = (*self.versions).clone();
        versions.push(version.clone());
        let mut schemas = (*self.schemas).clone();
        schemas.insert(version, Arc::new(schema));

        Ok(Self {
            versions: Arc::new(versions),
            schemas: Arc::new(schemas),
        })
    }

    /// Builds a catalog from unordered entries, ordering them per `ordering`.
    pub fn from_entries<I, V>(entries: I, ordering: VersionOrdering) -> Result<Self>
    where
        I: IntoIterator<Item = (V, Schema)>,
        V: Into<SchemaVersion>,
    {
        let mut entries: Vec<(SchemaVersion, Schema)> = entries
            .into_iter()
            .map(|(version, schema)| (version.into(), schema))
            .collect();
        ordering.sort(&mut entries, |(version, _)| version.name());

        entries
            .into_iter()
            .try_fold(Self::new(), |catalog, (version, schema)| catalog.with_version(version, schema))
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn contains(&self, version: &SchemaVersion) -> bool {
        self.schemas.contains_key(version)
    }

    /// Newest registered version.
    pub fn latest(&self) -> Option<&SchemaVersion> {
        self.versions.last()
    }
}

impl SchemaCatalog for InMemoryCatalog {
    fn ordered_versions(&self) -> &[SchemaVersion] {
        &self.versions
    }

    fn schema(&self, version: &SchemaVersion) -> Result<Arc<Schema>> {
        self.schemas
            .get(version)
            .cloned()
            .ok_or_else(|| MigrateError::UnknownVersion(version.to_string()))
    }
}
