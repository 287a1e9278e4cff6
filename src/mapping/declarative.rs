use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use super::{EntityMapping, FieldRule, MappingRegistry, MappingRule};
use crate::catalog::SchemaVersion;
use crate::core::{Result, Value};

/// JSON form of a `MappingRule`, as found in catalog manifests.
///
/// ```json
/// { "source": "Model 3", "target": "Model 4",
///   "entities": { "Customer": { "from_entity": "Client",
///                               "fields": { "email": { "copy_from": "mail" },
///                                           "age": { "cast_from": "age_text" },
///                                           "tier": { "constant": "basic" },
///                                           "score": "default" } } } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSpec {
    pub source: SchemaVersion,
    pub target: SchemaVersion,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityMappingSpec>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityMappingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_entity: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldRuleSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRuleSpec {
    CopyFrom(String),
    CastFrom(String),
    Constant(Value),
    Default,
}

impl From<FieldRuleSpec> for FieldRule {
    fn from(spec: FieldRuleSpec) -> Self {
        match spec {
            FieldRuleSpec::CopyFrom(from) => FieldRule::CopyFrom(from),
            FieldRuleSpec::CastFrom(from) => FieldRule::Cast { from },
            FieldRuleSpec::Constant(value) => FieldRule::Constant(value),
            FieldRuleSpec::Default => FieldRule::Default,
        }
    }
}

impl From<EntityMappingSpec> for EntityMapping {
    fn from(spec: EntityMappingSpec) -> Self {
        let mapping = match spec.from_entity {
            Some(source) => EntityMapping::new().from_entity(source),
            None => EntityMapping::new(),
        };
        spec.fields
            .into_iter()
            .fold(mapping, |mapping, (field, rule)| mapping.field(field, rule.into()))
    }
}

impl MappingSpec {
    pub fn into_rule(self) -> (SchemaVersion, SchemaVersion, MappingRule) {
        let rule = self
            .entities
            .into_iter()
            .fold(MappingRule::new(), |rule, (entity, spec)| rule.with_entity(entity, spec.into()));
        (self.source, self.target, rule)
    }
}

/// Builds a registry from declarative specs; duplicate pairs are rejected.
pub fn registry_from_specs(specs: impl IntoIterator<Item = MappingSpec>) -> Result<MappingRegistry> {
    let mut registry = MappingRegistry::new();
    for spec in specs {
        let (source, target, rule) = spec.into_rule();
        registry.register(source, target, rule)?;
    }
    Ok(registry)
}
