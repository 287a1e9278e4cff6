//! Resolves, for one step, where every target field gets its value.
//!
//! Inference is exact-match only: a same-named field carries over when its
//! declared type is identical. A same-named field whose type changed is an
//! ambiguity and needs an explicit rule; no coercion is guessed.

use std::fmt;
use super::{DeriveFn, FieldRule, MappingRule, RecordHookFn};
use crate::core::{DataType, EntityDef, FieldDef, MigrateError, Result, Schema, Value};

/// Resolved source of one target field.
#[derive(Clone)]
pub enum ResolvedField {
    Copy { from: String },
    Cast { from: String, to: DataType },
    Constant(Value),
    Initial(Value),
    Derive(DeriveFn),
}

impl fmt::Debug for ResolvedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy { from } => f.debug_struct("Copy").field("from", from).finish(),
            Self::Cast { from, to } => f.debug_struct("Cast").field("from", from).field("to", to).finish(),
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Initial(value) => f.debug_tuple("Initial").field(value).finish(),
            Self::Derive(_) => f.write_str("Derive(..)"),
        }
    }
}

/// How one target entity is produced.
#[derive(Clone)]
pub struct EntityTransform {
    pub target: EntityDef,
    /// `None` when the entity is new in the target schema; it starts empty.
    pub source_entity: Option<String>,
    pub fields: Vec<(FieldDef, ResolvedField)>,
    pub record_hook: Option<RecordHookFn>,
}

impl fmt::Debug for EntityTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityTransform")
            .field("target", &self.target.name)
            .field("source_entity", &self.source_entity)
            .field("fields", &self.fields)
            .field("has_record_hook", &self.record_hook.is_some())
            .finish()
    }
}

/// Full schema-level transform for one step.
#[derive(Debug, Clone)]
pub struct StepTransform {
    pub entities: Vec<EntityTransform>,
    /// Source entities that no target entity reads; their records are dropped.
    pub dropped_entities: Vec<String>,
}

/// Builds the transform from `source` to `target`, consulting `rule` first.
pub fn infer_transform(source: &Schema, target: &Schema, rule: Option<&MappingRule>) -> Result<StepTransform> {
    if let Some(rule) = rule {
        if let Some((name, _)) = rule.entities().find(|(name, _)| target.entity(name).is_none()) {
            return Err(MigrateError::MappingError(format!(
                "Custom mapping targets entity '{}' which the target schema does not declare",
                name
            )));
        }
    }

    let mut entities = Vec::with_capacity(target.entity_count());
    for target_entity in &target.entities {
        let custom = rule.and_then(|rule| rule.entity(&target_entity.name));

        let source_entity = match custom.and_then(|mapping| mapping.source_entity()) {
            Some(name) => Some(source.entity(name).ok_or_else(|| {
                MigrateError::MappingError(format!(
                    "Entity '{}' maps from '{}' which the source schema does not declare",
                    target_entity.name, name
                ))
            })?),
            None => source.entity(&target_entity.name),
        };

        if let Some(mapping) = custom {
            if let Some(field) = mapping.fields.keys().find(|field| target_entity.field(field).is_none()) {
                return Err(MigrateError::MappingError(format!(
                    "Custom mapping for entity '{}' names undeclared field '{}'",
                    target_entity.name, field
                )));
            }
        }

        let mut fields = Vec::with_capacity(target_entity.fields.len());
        for field in &target_entity.fields {
            let resolved = match custom.and_then(|mapping| mapping.rule_for(&field.name)) {
                Some(rule) => resolve_custom(target_entity, field, source_entity, rule)?,
                None => infer_field(target_entity, field, source_entity)?,
            };
            fields.push((field.clone(), resolved));
        }

        entities.push(EntityTransform {
            target: target_entity.clone(),
            source_entity: source_entity.map(|entity| entity.name.clone()),
            fields,
            record_hook: custom.and_then(|mapping| mapping.record_hook.clone()),
        });
    }

    let dropped_entities = source
        .entities
        .iter()
        .filter(|entity| {
            !entities
                .iter()
                .any(|transform| transform.source_entity.as_deref() == Some(entity.name.as_str()))
        })
        .map(|entity| entity.name.clone())
        .collect();

    Ok(StepTransform { entities, dropped_entities })
}

fn infer_field(entity: &EntityDef, field: &FieldDef, source: Option<&EntityDef>) -> Result<ResolvedField> {
    let Some(source_field) = source.and_then(|source| source.field(&field.name)) else {
        return Ok(ResolvedField::Initial(field.initial_value()));
    };

    if source_field.data_type != field.data_type {
        return Err(MigrateError::MappingError(format!(
            "Ambiguous mapping for '{}.{}': type changes from {} to {} and no custom mapping is registered",
            entity.name, field.name, source_field.data_type, field.data_type
        )));
    }

    Ok(ResolvedField::Copy { from: source_field.name.clone() })
}

fn resolve_custom(
    entity: &EntityDef,
    field: &FieldDef,
    source: Option<&EntityDef>,
    rule: &FieldRule,
) -> Result<ResolvedField> {
    let source_field = |name: &str| {
        source.and_then(|source| source.field(name)).ok_or_else(|| {
            MigrateError::MappingError(format!(
                "Field '{}.{}' maps from '{}' which the source entity does not declare",
                entity.name, field.name, name
            ))
        })
    };

    match rule {
        FieldRule::CopyFrom(from) => {
            let source_field = source_field(from.as_str())?;
            if source_field.data_type != field.data_type {
                return Err(MigrateError::MappingError(format!(
                    "Field '{}.{}' copies '{}' of type {} into type {}; use a cast rule",
                    entity.name, field.name, from, source_field.data_type, field.data_type
                )));
            }
            Ok(ResolvedField::Copy { from: from.clone() })
        }
        FieldRule::Cast { from } => {
            source_field(from.as_str())?;
            Ok(ResolvedField::Cast {
                from: from.clone(),
                to: field.data_type,
            })
        }
        FieldRule::Constant(value) => {
            field.validate(value).map_err(|err| {
                MigrateError::MappingError(format!("Constant for '{}.{}': {}", entity.name, field.name, err))
            })?;
            Ok(ResolvedField::Constant(value.clone()))
        }
        FieldRule::Default => Ok(ResolvedField::Initial(field.initial_value())),
        FieldRule::Derive(derive) => Ok(ResolvedField::Derive(derive.clone())),
    }
}
