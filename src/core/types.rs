use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use super::{DataType, MigrateError, Result, Value};

/// One stored object: field name to value.
pub type Record = BTreeMap<String, Value>;

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Value a newly introduced field receives in migrated records.
    pub fn initial_value(&self) -> Value {
        match &self.default {
            Some(value) => value.clone(),
            None if self.nullable => Value::Null,
            None => self.data_type.zero_value(),
        }
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(MigrateError::SchemaViolation(format!(
                    "Field '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(MigrateError::TypeMismatch(format!(
                "Field '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Checks a record against this entity: all declared fields present and
    /// well-typed, nothing undeclared.
    pub fn validate_record(&self, record: &Record) -> Result<()> {
        for field in &self.fields {
            let value = record.get(&field.name).ok_or_else(|| {
                MigrateError::SchemaViolation(format!(
                    "Entity '{}' record is missing field '{}'",
                    self.name, field.name
                ))
            })?;
            field.validate(value).map_err(|err| {
                MigrateError::SchemaViolation(format!("Entity '{}': {}", self.name, err))
            })?;
        }

        if let Some(extra) = record.keys().find(|key| self.field(key).is_none()) {
            return Err(MigrateError::SchemaViolation(format!(
                "Entity '{}' does not declare field '{}'",
                self.name, extra
            )));
        }

        Ok(())
    }
}

/// Structural description of a store for one schema version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub entities: Vec<EntityDef>,
}

impl Schema {
    pub fn new(entities: Vec<EntityDef>) -> Self {
        Self { entities }
    }

    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|entity| entity.name == name)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}
