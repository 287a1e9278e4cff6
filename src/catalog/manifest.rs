//! JSON catalog manifests.
//!
//! ```json
//! {
//!   "ordering": "natural_name",
//!   "versions": [
//!     { "name": "Model 1", "schema": { "entities": [] } },
//!     { "name": "Model 2", "schema_file": "schemas/model-2.json" }
//!   ],
//!   "mappings": []
//! }
//! ```
//!
//! `schema_file` paths are resolved relative to the manifest's directory.

use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use super::{InMemoryCatalog, SchemaVersion, VersionOrdering};
use crate::core::{MigrateError, Result, Schema};
use crate::mapping::{MappingRegistry, MappingSpec, registry_from_specs};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogManifest {
    #[serde(default)]
    pub ordering: VersionOrdering,
    pub versions: Vec<ManifestVersion>,
    #[serde(default)]
    pub mappings: Vec<MappingSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestVersion {
    pub name: SchemaVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<PathBuf>,
}

/// Catalog and declarative mappings read from one manifest.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub catalog: InMemoryCatalog,
    pub mappings: MappingRegistry,
}

impl CatalogManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MigrateError::InvalidCatalog(format!("Malformed catalog manifest: {}", e)))
    }

    /// Builds the catalog, loading external schema files from `base_dir`.
    pub fn resolve(self, base_dir: &Path) -> Result<LoadedManifest> {
        let mut entries = Vec::with_capacity(self.versions.len());
        for version in self.versions {
            let schema = match (version.schema, version.schema_file) {
                (Some(schema), None) => schema,
                (None, Some(file)) => read_schema_file(&base_dir.join(file))?,
                (Some(_), Some(_)) => {
                    return Err(MigrateError::InvalidCatalog(format!(
                        "Version '{}' declares both 'schema' and 'schema_file'",
                        version.name
                    )));
                }
                (None, None) => {
                    return Err(MigrateError::InvalidCatalog(format!(
                        "Version '{}' has no schema",
                        version.name
                    )));
                }
            };
            entries.push((version.name, schema));
        }

        let catalog = InMemoryCatalog::from_entries(entries, self.ordering)?;
        let mappings = registry_from_specs(self.mappings)?;
        mappings.validate_against(&catalog)?;

        Ok(LoadedManifest { catalog, mappings })
    }
}

fn read_schema_file(path: &Path) -> Result<Schema> {
    let json = fs::read_to_string(path)
        .map_err(|e| MigrateError::io(format!("Failed to read schema file '{}'", path.display()), e))?;
    serde_json::from_str(&json).map_err(|e| {
        MigrateError::InvalidCatalog(format!("Malformed schema file '{}': {}", path.display(), e))
    })
}

/// Reads and resolves the manifest at `path`.
pub fn load_manifest(path: &Path) -> Result<LoadedManifest> {
    let json = fs::read_to_string(path)
        .map_err(|e| MigrateError::io(format!("Failed to read catalog manifest '{}'", path.display()), e))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    CatalogManifest::from_json(&json)?.resolve(base_dir)
}
