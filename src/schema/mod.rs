//! Entity schema
//!
//! Describes the entities a stack can persist, their attributes, and the
//! version/rename hints used to infer migrations between schema revisions.

pub mod bundle;
pub mod migration;

pub use bundle::SchemaBundle;
pub use migration::MigrationPlan;

use crate::types::{Hash, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Storage kind of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Bool,
    Integer,
    Double,
    String,
    Bytes,
    Reference,
}

impl AttributeKind {
    /// Whether `value` may be stored in an attribute of this kind.
    ///
    /// Null is accepted here; optionality is checked separately.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (AttributeKind::Bool, Value::Bool(_))
                | (AttributeKind::Integer, Value::Integer(_))
                | (AttributeKind::Double, Value::Double(_))
                | (AttributeKind::Double, Value::Integer(_))
                | (AttributeKind::String, Value::String(_))
                | (AttributeKind::Bytes, Value::Bytes(_))
                | (AttributeKind::Reference, Value::Reference(_))
        )
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeKind::Bool => "bool",
            AttributeKind::Integer => "integer",
            AttributeKind::Double => "double",
            AttributeKind::String => "string",
            AttributeKind::Bytes => "bytes",
            AttributeKind::Reference => "reference",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescription {
    pub name: String,
    pub kind: AttributeKind,
    #[serde(default)]
    pub optional: bool,
    /// Value assigned to newly inserted objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Destination entity of a reference attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Name of this attribute in the previous schema version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>,
}

impl AttributeDescription {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
            default: None,
            target: None,
            renamed_from: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn referencing(mut self, entity: impl Into<String>) -> Self {
        self.target = Some(entity.into());
        self
    }

    pub fn renamed_from(mut self, previous: impl Into<String>) -> Self {
        self.renamed_from = Some(previous.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>,
}

impl EntityDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            renamed_from: None,
        }
    }

    pub fn attribute(mut self, attribute: AttributeDescription) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn renamed_from(mut self, previous: impl Into<String>) -> Self {
        self.renamed_from = Some(previous.into());
        self
    }

    pub fn attribute_named(&self, name: &str) -> Option<&AttributeDescription> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute_named(name).is_some()
    }

    /// Values a freshly inserted object starts with.
    pub fn default_values(&self) -> BTreeMap<String, Value> {
        self.attributes
            .iter()
            .filter_map(|a| a.default.clone().map(|v| (a.name.clone(), v)))
            .collect()
    }

    /// Check a full set of object values against this entity.
    ///
    /// Returns every problem found rather than stopping at the first one.
    pub fn validate(
        &self,
        object: crate::types::ObjectId,
        values: &BTreeMap<String, Value>,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for (key, value) in values {
            match self.attribute_named(key) {
                None => issues.push(ValidationIssue {
                    object,
                    entity: self.name.clone(),
                    attribute: key.clone(),
                    problem: ValidationProblem::UnknownAttribute,
                }),
                Some(attribute) if !attribute.kind.accepts(value) => {
                    issues.push(ValidationIssue {
                        object,
                        entity: self.name.clone(),
                        attribute: key.clone(),
                        problem: ValidationProblem::TypeMismatch {
                            expected: attribute.kind,
                            found: value.type_name().to_string(),
                        },
                    })
                }
                Some(_) => {}
            }
        }

        for attribute in self.attributes.iter().filter(|a| !a.optional) {
            let missing = values.get(&attribute.name).map_or(true, Value::is_null);
            if missing {
                issues.push(ValidationIssue {
                    object,
                    entity: self.name.clone(),
                    attribute: attribute.name.clone(),
                    problem: ValidationProblem::MissingRequired,
                });
            }
        }

        issues
    }
}

/// One reason an object failed validation at commit time
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub object: crate::types::ObjectId,
    pub entity: String,
    pub attribute: String,
    pub problem: ValidationProblem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationProblem {
    UnknownAttribute,
    TypeMismatch { expected: AttributeKind, found: String },
    MissingRequired,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            ValidationProblem::UnknownAttribute => {
                write!(f, "{}.{}: unknown attribute", self.entity, self.attribute)
            }
            ValidationProblem::TypeMismatch { expected, found } => write!(
                f,
                "{}.{}: expected {}, found {}",
                self.entity, self.attribute, expected, found
            ),
            ValidationProblem::MissingRequired => {
                write!(f, "{}.{}: required value missing", self.entity, self.attribute)
            }
        }
    }
}

/// A named, versioned set of entity descriptions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub entities: Vec<EntityDescription>,
}

fn default_version() -> u32 {
    1
}

impl Schema {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            entities: Vec::new(),
        }
    }

    pub fn entity(mut self, entity: EntityDescription) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn entity_named(&self, name: &str) -> Option<&EntityDescription> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Look up an entity, treating an unknown name as a caller bug.
    ///
    /// # Panics
    ///
    /// Panics when `name` is not part of this schema.
    pub fn expect_entity(&self, name: &str) -> &EntityDescription {
        self.entity_named(name).unwrap_or_else(|| {
            panic!(
                "Entity named '{}' doesn't exist in schema '{}' (v{})",
                name, self.name, self.version
            )
        })
    }

    /// Fingerprint of the entity layout.
    ///
    /// Two schemas with the same fingerprint can read each other's stores
    /// without migration. Name and version are deliberately excluded so a
    /// version bump without structural change does not force a migration.
    pub fn fingerprint(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        for entity in &self.entities {
            hasher.update(b"entity:");
            hasher.update(entity.name.as_bytes());
            for attribute in &entity.attributes {
                hasher.update(b"attr:");
                hasher.update(attribute.name.as_bytes());
                hasher.update(attribute.kind.to_string().as_bytes());
                hasher.update(&[attribute.optional as u8]);
            }
        }
        *hasher.finalize().as_bytes()
    }

    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint())
    }
}
