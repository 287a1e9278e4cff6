use std::collections::HashMap;
use super::{SchemaCatalog, SchemaVersion};
use crate::core::{MigrateError, Result};

/// Maps versions to their positions in a catalog's order.
///
/// Built once per planning request from the catalog snapshot; lookups are
/// pure and never touch the filesystem.
pub struct VersionResolver<'a> {
    versions: &'a [SchemaVersion],
    positions: HashMap<&'a SchemaVersion, usize>,
}

impl<'a> VersionResolver<'a> {
    pub fn new(catalog: &'a dyn SchemaCatalog) -> Result<Self> {
        let versions = catalog.ordered_versions();
        let mut positions = HashMap::with_capacity(versions.len());
        for (position, version) in versions.iter().enumerate() {
            if positions.insert(version, position).is_some() {
                return Err(MigrateError::InvalidCatalog(format!(
                    "Schema version '{}' appears more than once in catalog order",
                    version
                )));
            }
        }
        Ok(Self { versions, positions })
    }

    /// Position of `version` in catalog order, or `UnknownVersion`.
    pub fn index_of(&self, version: &SchemaVersion) -> Result<usize> {
        self.positions
            .get(version)
            .copied()
            .ok_or_else(|| MigrateError::UnknownVersion(version.to_string()))
    }

    pub fn version_at(&self, position: usize) -> Option<&'a SchemaVersion> {
        self.versions.get(position)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::core::Schema;

    fn catalog() -> InMemoryCatalog {
        ["a", "b", "c"].into_iter().fold(InMemoryCatalog::new(), |catalog, name| {
            catalog.with_version(name, Schema::default()).unwrap()
        })
    }

    #[test]
    fn test_index_of_registered_versions() {
        let catalog = catalog();
        let resolver = VersionResolver::new(&catalog).unwrap();
        assert_eq!(resolver.index_of(&"a".into()).unwrap(), 0);
        assert_eq!(resolver.index_of(&"c".into()).unwrap(), 2);
        assert_eq!(resolver.len(), 3);
    }

    #[test]
    fn test_index_of_unknown_version_fails() {
        let catalog = catalog();
        let resolver = VersionResolver::new(&catalog).unwrap();
        let err = resolver.index_of(&"z".into()).unwrap_err();
        assert!(matches!(err, MigrateError::UnknownVersion(name) if name == "z"));
    }
}
