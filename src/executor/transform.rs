use crate::core::{MigrateError, Record, Result, Schema, Value};
use crate::mapping::{EntityTransform, ResolvedField, StepTransform};
use crate::storage::EntityRecords;

/// Applies a resolved step transform to every record of the input store.
///
/// Output records are validated against the target entity; the input is
/// only borrowed.
pub fn apply_transform(transform: &StepTransform, source_schema: &Schema, input: &EntityRecords) -> Result<EntityRecords> {
    if let Some(unknown) = input.keys().find(|name| source_schema.entity(name).is_none()) {
        return Err(MigrateError::SchemaViolation(format!(
            "Store holds records for entity '{}' which its schema does not declare",
            unknown
        )));
    }

    let mut output = EntityRecords::new();
    for entity in &transform.entities {
        let source_records = entity
            .source_entity
            .as_deref()
            .and_then(|name| input.get(name))
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let mut records = Vec::with_capacity(source_records.len());
        for (index, source) in source_records.iter().enumerate() {
            let record = transform_record(entity, source).map_err(|err| {
                MigrateError::SchemaViolation(format!(
                    "Entity '{}' record #{}: {}",
                    entity.target.name, index, err
                ))
            })?;
            records.push(record);
        }
        output.insert(entity.target.name.clone(), records);
    }

    Ok(output)
}

fn transform_record(entity: &EntityTransform, source: &Record) -> Result<Record> {
    let mut record = Record::new();

    for (field, resolved) in &entity.fields {
        let mut value = match resolved {
            ResolvedField::Copy { from } => source_value(source, from)?.clone(),
            ResolvedField::Cast { from, to } => source_value(source, from)?.cast_to(to)?,
            ResolvedField::Constant(value) | ResolvedField::Initial(value) => value.clone(),
            ResolvedField::Derive(derive) => derive(source)?,
        };

        if value.is_null() && !field.nullable {
            value = field.default.clone().ok_or_else(|| {
                MigrateError::SchemaViolation(format!(
                    "NULL for non-nullable field '{}' and no default is declared",
                    field.name
                ))
            })?;
        }

        record.insert(field.name.clone(), value);
    }

    if let Some(hook) = &entity.record_hook {
        hook(source, &mut record)?;
    }

    entity.target.validate_record(&record)?;
    Ok(record)
}

fn source_value<'a>(record: &'a Record, field: &str) -> Result<&'a Value> {
    record.get(field).ok_or_else(|| {
        MigrateError::SchemaViolation(format!("Source record is missing field '{}'", field))
    })
}
