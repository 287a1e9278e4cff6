//! Per-step custom mapping rules and the lookup used to find them.
//!
//! A rule is keyed by an adjacent `(source, target)` version pair. Anything a
//! rule does not mention falls back to automatic inference (see `inference`).

pub mod declarative;
pub mod inference;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use crate::catalog::{SchemaCatalog, SchemaVersion, VersionResolver};
use crate::core::{MigrateError, Record, Result, Value};

pub use declarative::{EntityMappingSpec, FieldRuleSpec, MappingSpec, registry_from_specs};
pub use inference::{EntityTransform, ResolvedField, StepTransform, infer_transform};

/// Computes a target field value from the whole source record.
pub type DeriveFn = Arc<dyn Fn(&Record) -> Result<Value> + Send + Sync>;

/// Runs after field rules with the source record and the (mutable) output record.
pub type RecordHookFn = Arc<dyn Fn(&Record, &mut Record) -> Result<()> + Send + Sync>;

/// How one target field obtains its value.
#[derive(Clone)]
pub enum FieldRule {
    /// Copy a differently named source field of the same type.
    CopyFrom(String),
    /// Convert a source field into the target field's type.
    Cast { from: String },
    Constant(Value),
    /// The target field's initial value, even if a same-named source field exists.
    Default,
    Derive(DeriveFn),
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CopyFrom(from) => f.debug_tuple("CopyFrom").field(from).finish(),
            Self::Cast { from } => f.debug_struct("Cast").field("from", from).finish(),
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Default => f.write_str("Default"),
            Self::Derive(_) => f.write_str("Derive(..)"),
        }
    }
}

/// Custom mapping for a single target entity.
#[derive(Clone, Default)]
pub struct EntityMapping {
    pub(crate) from_entity: Option<String>,
    pub(crate) fields: HashMap<String, FieldRule>,
    pub(crate) record_hook: Option<RecordHookFn>,
}

impl fmt::Debug for EntityMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMapping")
            .field("from_entity", &self.from_entity)
            .field("fields", &self.fields)
            .field("has_record_hook", &self.record_hook.is_some())
            .finish()
    }
}

impl EntityMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source entity feeding this target entity when it was renamed.
    pub fn from_entity(mut self, name: impl Into<String>) -> Self {
        self.from_entity = Some(name.into());
        self
    }

    pub fn field(mut self, target_field: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(target_field.into(), rule);
        self
    }

    pub fn rename_field(self, target_field: impl Into<String>, source_field: impl Into<String>) -> Self {
        self.field(target_field, FieldRule::CopyFrom(source_field.into()))
    }

    pub fn cast_field(self, target_field: impl Into<String>, source_field: impl Into<String>) -> Self {
        self.field(target_field, FieldRule::Cast { from: source_field.into() })
    }

    pub fn derive_field<F>(self, target_field: impl Into<String>, derive: F) -> Self
    where
        F: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
    {
        self.field(target_field, FieldRule::Derive(Arc::new(derive)))
    }

    pub fn with_record_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Record, &mut Record) -> Result<()> + Send + Sync + 'static,
    {
        self.record_hook = Some(Arc::new(hook));
        self
    }

    pub fn source_entity(&self) -> Option<&str> {
        self.from_entity.as_deref()
    }

    pub fn rule_for(&self, target_field: &str) -> Option<&FieldRule> {
        self.fields.get(target_field)
    }
}

/// Custom mapping for one adjacent version pair, keyed by target entity name.
#[derive(Debug, Clone, Default)]
pub struct MappingRule {
    entities: HashMap<String, EntityMapping>,
}

impl MappingRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, target_entity: impl Into<String>, mapping: EntityMapping) -> Self {
        self.entities.insert(target_entity.into(), mapping);
        self
    }

    pub fn entity(&self, target_entity: &str) -> Option<&EntityMapping> {
        self.entities.get(target_entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = (&str, &EntityMapping)> {
        self.entities.iter().map(|(name, mapping)| (name.as_str(), mapping))
    }
}

/// Lookup of custom rules by `(source, target)` pair.
pub trait MappingProvider: Send + Sync {
    fn mapping(&self, source: &SchemaVersion, target: &SchemaVersion) -> Option<Arc<MappingRule>>;
}

/// In-memory `MappingProvider`.
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    rules: HashMap<(SchemaVersion, SchemaVersion), Arc<MappingRule>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        source: impl Into<SchemaVersion>,
        target: impl Into<SchemaVersion>,
        rule: MappingRule,
    ) -> Result<()> {
        let key = (source.into(), target.into());
        if self.rules.contains_key(&key) {
            return Err(MigrateError::MappingError(format!(
                "Duplicate mapping for '{}' -> '{}'",
                key.0, key.1
            )));
        }
        self.rules.insert(key, Arc::new(rule));
        Ok(())
    }

    /// Fluent variant of `register`.
    pub fn with_mapping(
        mut self,
        source: impl Into<SchemaVersion>,
        target: impl Into<SchemaVersion>,
        rule: MappingRule,
    ) -> Result<Self> {
        self.register(source, target, rule)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rejects rules for unregistered versions or non-adjacent pairs; such a
    /// rule could never be consulted.
    pub fn validate_against(&self, catalog: &dyn SchemaCatalog) -> Result<()> {
        let resolver = VersionResolver::new(catalog)?;
        for (source, target) in self.rules.keys() {
            let source_position = resolver.index_of(source)?;
            let target_position = resolver.index_of(target)?;
            if target_position != source_position + 1 {
                return Err(MigrateError::InvalidCatalog(format!(
                    "Mapping '{}' -> '{}' does not connect adjacent versions",
                    source, target
                )));
            }
        }
        Ok(())
    }
}

impl MappingProvider for MappingRegistry {
    fn mapping(&self, source: &SchemaVersion, target: &SchemaVersion) -> Option<Arc<MappingRule>> {
        self.rules.get(&(source.clone(), target.clone())).cloned()
    }
}
