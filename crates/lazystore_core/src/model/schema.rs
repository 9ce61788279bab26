//! Model schemas and the registry that validates them.
//!
//! # Responsibility
//! - Collect the field descriptors and identity of each model.
//! - Validate names, identities, relation targets and inverse pairing before
//!   a store can be built.
//!
//! # Invariants
//! - Field order is declaration order; it drives initialization and the
//!   field-clearing order of soft delete.
//! - After `finalize`, every declared inverse is paired in both directions.

use crate::error::SchemaError;
use crate::model::field::{FieldDescriptor, FieldKind, RelationKind};
use crate::model::identity::Identity;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::rc::Rc;

static MODEL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("valid model name regex"));
static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid field name regex"));

/// Declared shape of one model.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: String,
    identity: Option<Identity>,
    fields: IndexMap<String, FieldDescriptor>,
    duplicate_fields: Vec<String>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: None,
            fields: IndexMap::new(),
            duplicate_fields: Vec::new(),
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, field: impl Into<FieldDescriptor>) -> Self {
        let name = name.into();
        if self.fields.contains_key(name.as_str()) {
            self.duplicate_fields.push(name);
            return self;
        }
        self.fields.insert(name, field.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields
            .iter()
            .map(|(name, field)| (name.as_str(), field))
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn validate_local(&self) -> Result<(), SchemaError> {
        if !MODEL_NAME_RE.is_match(&self.name) {
            return Err(SchemaError::InvalidModelName(self.name.clone()));
        }
        if let Some(field) = self.duplicate_fields.first() {
            return Err(SchemaError::DuplicateField {
                model: self.name.clone(),
                field: field.clone(),
            });
        }
        for (name, field) in &self.fields {
            if !FIELD_NAME_RE.is_match(name) {
                return Err(SchemaError::InvalidFieldName {
                    model: self.name.clone(),
                    field: name.clone(),
                });
            }
            if let Some(relation) = field.as_relation() {
                if relation.kind == RelationKind::One && relation.sort.is_some() {
                    return Err(SchemaError::SortOnOne {
                        model: self.name.clone(),
                        field: name.clone(),
                    });
                }
            }
        }
        if let Some(identity) = &self.identity {
            self.validate_identity(identity)?;
        }
        Ok(())
    }

    fn validate_identity(&self, identity: &Identity) -> Result<(), SchemaError> {
        match identity {
            Identity::Field(name) => match self.fields.get(name.as_str()) {
                None => Err(SchemaError::UnknownIdentityField {
                    model: self.name.clone(),
                    field: name.clone(),
                }),
                Some(field) if field.kind() == FieldKind::Many => Err(SchemaError::ManyIdentity {
                    model: self.name.clone(),
                    field: name.clone(),
                }),
                Some(_) => Ok(()),
            },
            Identity::And(operands) | Identity::Or(operands) => {
                if operands.is_empty() {
                    return Err(SchemaError::EmptyIdentityGroup(self.name.clone()));
                }
                operands
                    .iter()
                    .try_for_each(|operand| self.validate_identity(operand))
            }
        }
    }
}

/// Collection of model schemas awaiting validation.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    models: IndexMap<String, ModelSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one schema after per-model validation.
    pub fn register(&mut self, schema: ModelSchema) -> Result<(), SchemaError> {
        schema.validate_local()?;
        if self.models.contains_key(schema.name()) {
            return Err(SchemaError::DuplicateModel(schema.name.clone()));
        }
        self.models.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Builder form of `register`.
    pub fn with(mut self, schema: ModelSchema) -> Result<Self, SchemaError> {
        self.register(schema)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Validates cross-model references and pairs inverses.
    pub(crate) fn finalize(mut self) -> Result<IndexMap<String, Rc<ModelSchema>>, SchemaError> {
        let mut pairings = Vec::new();

        for (model_name, schema) in &self.models {
            for (field_name, field) in &schema.fields {
                let Some(relation) = field.as_relation() else {
                    continue;
                };
                let Some(target) = self.models.get(relation.target.as_str()) else {
                    return Err(SchemaError::UnknownTarget {
                        model: model_name.clone(),
                        field: field_name.clone(),
                        target: relation.target.clone(),
                    });
                };
                let Some(inverse) = relation.inverse.as_deref() else {
                    continue;
                };
                let Some(inverse_field) = target.fields.get(inverse) else {
                    return Err(SchemaError::UnknownInverse {
                        model: model_name.clone(),
                        field: field_name.clone(),
                        inverse: inverse.to_string(),
                    });
                };
                let Some(inverse_relation) = inverse_field.as_relation() else {
                    return Err(SchemaError::InverseNotRelational {
                        model: model_name.clone(),
                        field: field_name.clone(),
                        inverse: inverse.to_string(),
                    });
                };
                if inverse_relation.target != *model_name {
                    return Err(SchemaError::InverseNotRelational {
                        model: model_name.clone(),
                        field: field_name.clone(),
                        inverse: inverse.to_string(),
                    });
                }
                match inverse_relation.inverse.as_deref() {
                    Some(paired) if paired == field_name => {}
                    Some(_) => {
                        return Err(SchemaError::InverseMismatch {
                            model: model_name.clone(),
                            field: field_name.clone(),
                            inverse: inverse.to_string(),
                        });
                    }
                    None => pairings.push((
                        relation.target.clone(),
                        inverse.to_string(),
                        field_name.clone(),
                    )),
                }
            }
        }

        for (target, inverse, field_name) in pairings {
            if let Some(FieldDescriptor::Relation(relation)) = self
                .models
                .get_mut(target.as_str())
                .and_then(|schema| schema.fields.get_mut(inverse.as_str()))
            {
                relation.inverse = Some(field_name);
            }
        }

        Ok(self
            .models
            .into_iter()
            .map(|(name, schema)| (name, Rc::new(schema)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{ModelSchema, SchemaRegistry};
    use crate::error::SchemaError;
    use crate::model::field::{attr, many, one, FieldDescriptor};
    use crate::model::identity::Identity;

    fn person() -> ModelSchema {
        ModelSchema::new("Person")
            .with_identity(Identity::field("id"))
            .with_field("id", attr())
            .with_field("manager", one("Person").inverse("reports"))
            .with_field("reports", many("Person"))
    }

    #[test]
    fn pairs_missing_inverse_automatically() {
        let registry = SchemaRegistry::new()
            .with(person())
            .expect("person schema should register");
        let models = registry.finalize().expect("registry should finalize");
        let reports = models["Person"]
            .field("reports")
            .and_then(FieldDescriptor::as_relation)
            .expect("reports relation");
        assert_eq!(reports.inverse_field(), Some("manager"));
    }

    #[test]
    fn rejects_many_relation_in_identity() {
        let schema = ModelSchema::new("Team")
            .with_identity(Identity::field("members"))
            .with_field("members", many("Team"));
        let err = SchemaRegistry::new()
            .register(schema)
            .expect_err("many identity must fail");
        assert!(matches!(err, SchemaError::ManyIdentity { .. }));
    }

    #[test]
    fn rejects_unknown_target_and_duplicate_model() {
        let schema = ModelSchema::new("Task").with_field("owner", one("User"));
        let registry = SchemaRegistry::new()
            .with(schema)
            .expect("local validation passes");
        let err = registry
            .finalize()
            .expect_err("unknown target must fail");
        assert!(matches!(err, SchemaError::UnknownTarget { .. }));

        let mut registry = SchemaRegistry::new();
        registry.register(person()).expect("first registration");
        let err = registry
            .register(person())
            .expect_err("duplicate registration must fail");
        assert_eq!(err, SchemaError::DuplicateModel("Person".to_string()));
    }

    #[test]
    fn rejects_conflicting_inverse_and_invalid_names() {
        let schema = ModelSchema::new("Node")
            .with_field("parent", one("Node").inverse("children"))
            .with_field("children", many("Node").inverse("siblings"))
            .with_field("siblings", many("Node"));
        let err = SchemaRegistry::new()
            .with(schema)
            .expect("local validation passes")
            .finalize()
            .expect_err("conflicting inverse must fail");
        assert!(matches!(err, SchemaError::InverseMismatch { .. }));

        let err = SchemaRegistry::new()
            .register(ModelSchema::new("Bad Name"))
            .expect_err("spaces are not allowed");
        assert_eq!(err, SchemaError::InvalidModelName("Bad Name".to_string()));
    }

    #[test]
    fn rejects_sort_on_one_and_duplicate_fields() {
        let schema = ModelSchema::new("Doc").with_field(
            "owner",
            one("Doc").sort(|_, _, _| std::cmp::Ordering::Equal),
        );
        let err = SchemaRegistry::new()
            .register(schema)
            .expect_err("sort on one must fail");
        assert!(matches!(err, SchemaError::SortOnOne { .. }));

        let schema = ModelSchema::new("Doc")
            .with_field("title", attr())
            .with_field("title", attr());
        let err = SchemaRegistry::new()
            .register(schema)
            .expect_err("duplicate field must fail");
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }
}
