//! Inferred schema migration
//!
//! A plan is derived from the stored and requested schemas alone: attributes
//! and entities are matched by name or by their `renamed_from` hint, new
//! attributes take their default, and dropped ones are discarded. The whole
//! record set is transformed in memory so a failure leaves the store as it was.

use super::{AttributeKind, EntityDescription, Schema};
use crate::error::MigrationError;
use crate::store::Record;
use crate::types::Value;
use std::collections::BTreeMap;

/// How one attribute of the requested schema is populated
#[derive(Debug, Clone, PartialEq)]
enum AttributeSource {
    /// Copied from the named attribute of the stored entity
    Copy(String),
    /// New attribute, filled from its default (if any)
    Default(Option<Value>),
}

#[derive(Debug, Clone, PartialEq)]
struct AttributeMapping {
    name: String,
    source: AttributeSource,
    required: bool,
    widen_to_double: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct EntityMapping {
    source: String,
    destination: String,
    attributes: Vec<AttributeMapping>,
}

/// Mapping from one schema revision to another
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    from_version: u32,
    to_version: u32,
    entities: Vec<EntityMapping>,
}

impl MigrationPlan {
    /// Infer a mapping model from `stored` to `target`.
    pub fn infer(stored: &Schema, target: &Schema) -> Result<Self, MigrationError> {
        if stored.name != target.name {
            return Err(MigrationError::SchemaMismatch {
                stored: stored.name.clone(),
                requested: target.name.clone(),
            });
        }

        let mut entities = Vec::new();
        for destination in &target.entities {
            let source = stored.entity_named(&destination.name).or_else(|| {
                destination
                    .renamed_from
                    .as_deref()
                    .and_then(|previous| stored.entity_named(previous))
            });

            // Entities without a stored counterpart start empty.
            let Some(source) = source else { continue };
            entities.push(Self::map_entity(source, destination)?);
        }

        Ok(Self {
            from_version: stored.version,
            to_version: target.version,
            entities,
        })
    }

    fn map_entity(
        source: &EntityDescription,
        destination: &EntityDescription,
    ) -> Result<EntityMapping, MigrationError> {
        let mut attributes = Vec::new();
        for attribute in &destination.attributes {
            let previous = source.attribute_named(&attribute.name).or_else(|| {
                attribute
                    .renamed_from
                    .as_deref()
                    .and_then(|name| source.attribute_named(name))
            });

            let (source_attr, widen_to_double) = match previous {
                Some(previous) if previous.kind == attribute.kind => {
                    (AttributeSource::Copy(previous.name.clone()), false)
                }
                Some(previous)
                    if previous.kind == AttributeKind::Integer
                        && attribute.kind == AttributeKind::Double =>
                {
                    (AttributeSource::Copy(previous.name.clone()), true)
                }
                Some(previous) => {
                    return Err(MigrationError::IncompatibleAttribute {
                        entity: destination.name.clone(),
                        attribute: attribute.name.clone(),
                        from: previous.kind.to_string(),
                        to: attribute.kind.to_string(),
                    })
                }
                None => (AttributeSource::Default(attribute.default.clone()), false),
            };

            attributes.push(AttributeMapping {
                name: attribute.name.clone(),
                source: source_attr,
                required: !attribute.optional,
                widen_to_double,
            });
        }

        Ok(EntityMapping {
            source: source.name.clone(),
            destination: destination.name.clone(),
            attributes,
        })
    }

    pub fn from_version(&self) -> u32 {
        self.from_version
    }

    pub fn to_version(&self) -> u32 {
        self.to_version
    }

    /// Transform every stored record; records of dropped entities are discarded.
    pub fn apply(&self, records: Vec<Record>) -> Result<Vec<Record>, MigrationError> {
        let by_source: BTreeMap<&str, &EntityMapping> = self
            .entities
            .iter()
            .map(|mapping| (mapping.source.as_str(), mapping))
            .collect();

        let mut migrated = Vec::with_capacity(records.len());
        for record in records {
            let Some(mapping) = by_source.get(record.entity.as_str()) else {
                continue;
            };

            let mut values = BTreeMap::new();
            for attribute in &mapping.attributes {
                let value = match &attribute.source {
                    AttributeSource::Copy(previous) => {
                        record.values.get(previous).cloned().unwrap_or_default()
                    }
                    AttributeSource::Default(default) => default.clone().unwrap_or_default(),
                };
                let value = match value {
                    Value::Integer(i) if attribute.widen_to_double => Value::Double(i as f64),
                    other => other,
                };

                if value.is_null() {
                    if attribute.required {
                        return Err(MigrationError::MissingValue {
                            entity: mapping.destination.clone(),
                            attribute: attribute.name.clone(),
                            id: record.id,
                        });
                    }
                    continue;
                }
                values.insert(attribute.name.clone(), value);
            }

            migrated.push(Record {
                id: record.id,
                entity: mapping.destination.clone(),
                values,
            });
        }
        Ok(migrated)
    }
}
