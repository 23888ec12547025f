//! In-process schema catalog loaded from a schema document.

use super::descriptor::{
    FieldDescriptor, FieldKind, ModelDescriptor, PrimaryKey, RelationTarget, ScalarType,
};
use super::SchemaCatalog;
use crate::config::ConfigError;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Schema document as written on disk.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDocument {
    models: Vec<ModelDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelDocument {
    name: String,
    #[serde(default)]
    primary_key: Option<PrimaryKey>,
    fields: Vec<FieldDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDocument {
    name: String,
    #[serde(rename = "type", default)]
    scalar_type: Option<ScalarType>,
    #[serde(default)]
    id: bool,
    #[serde(default)]
    list: bool,
    #[serde(default)]
    required: Option<bool>,
    #[serde(default)]
    unique: bool,
    #[serde(default)]
    default: bool,
    #[serde(default)]
    relation: Option<RelationTarget>,
}

impl FieldDocument {
    fn into_descriptor(self) -> FieldDescriptor {
        let kind = match self.relation {
            Some(target) => FieldKind::Relation(target),
            None => FieldKind::Scalar(self.scalar_type.unwrap_or_default()),
        };
        FieldDescriptor {
            name: self.name,
            kind,
            is_id: self.id,
            is_list: self.list,
            is_required: self.required.unwrap_or(self.id),
            is_unique: self.unique || self.id,
            has_default: self.default,
        }
    }
}

impl ModelDocument {
    fn into_descriptor(self, problems: &mut Vec<String>) -> Option<ModelDescriptor> {
        let fields: Vec<FieldDescriptor> =
            self.fields.into_iter().map(FieldDocument::into_descriptor).collect();

        let primary_key = match self.primary_key {
            Some(pk) => pk,
            None => {
                let ids: Vec<String> = fields
                    .iter()
                    .filter(|f| f.is_id)
                    .map(|f| f.name.clone())
                    .collect();
                match ids.len() {
                    0 => {
                        problems.push(format!("model '{}' has no primary key", self.name));
                        return None;
                    }
                    1 => PrimaryKey::Single(ids[0].clone()),
                    _ => PrimaryKey::Composite(ids),
                }
            }
        };

        Some(ModelDescriptor::new(self.name, primary_key, fields))
    }
}

/// Schema catalog backed by validated, immutable model descriptors.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    models: Vec<ModelDescriptor>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog, rejecting inconsistent metadata.
    pub fn from_models(models: Vec<ModelDescriptor>) -> Result<Self, ConfigError> {
        let mut problems = Vec::new();
        let mut index = HashMap::new();
        for (i, model) in models.iter().enumerate() {
            if index.insert(model.name.clone(), i).is_some() {
                problems.push(format!("model '{}' is declared more than once", model.name));
            }
        }

        let catalog = Self { models, index };
        for model in &catalog.models {
            catalog.validate_model(model, &mut problems);
        }

        if !problems.is_empty() {
            return Err(ConfigError::Schema { problems });
        }

        tracing::debug!(models = catalog.models.len(), "Schema catalog loaded");
        Ok(catalog)
    }

    /// Parse a schema document (YAML or JSON).
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let doc: SchemaDocument = serde_yaml::from_str(content)?;
        let mut problems = Vec::new();
        let models: Vec<ModelDescriptor> = doc
            .models
            .into_iter()
            .filter_map(|m| m.into_descriptor(&mut problems))
            .collect();

        match Self::from_models(models) {
            Ok(catalog) if problems.is_empty() => Ok(catalog),
            Ok(_) => Err(ConfigError::Schema { problems }),
            Err(ConfigError::Schema { problems: more }) => {
                problems.extend(more);
                Err(ConfigError::Schema { problems })
            }
            Err(other) => Err(other),
        }
    }

    /// Load a schema document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    fn validate_model(&self, model: &ModelDescriptor, problems: &mut Vec<String>) {
        let mut seen = HashSet::new();
        for field in &model.fields {
            if !seen.insert(field.name.as_str()) {
                problems.push(format!(
                    "field '{}.{}' is declared more than once",
                    model.name, field.name
                ));
            }
        }

        for pk in model.primary_key.fields() {
            match model.field(pk) {
                Some(f) if f.is_scalar() => {}
                _ => problems.push(format!(
                    "primary key of '{}' names unknown scalar field '{}'",
                    model.name, pk
                )),
            }
        }

        for field in model.relations() {
            let Some(target) = field.relation_target() else {
                continue;
            };
            let location = format!("{}.{}", model.name, field.name);

            let Some(target_model) = self.model(&target.model) else {
                problems.push(format!(
                    "relation '{}' targets unknown model '{}'",
                    location, target.model
                ));
                continue;
            };

            if target.fields.len() != target.references.len() {
                problems.push(format!(
                    "relation '{}' maps {} foreign key field(s) to {} reference(s)",
                    location,
                    target.fields.len(),
                    target.references.len()
                ));
            }

            if field.is_list && target.owns_foreign_key() {
                problems.push(format!(
                    "list relation '{}' cannot own foreign key fields",
                    location
                ));
            }

            for column in &target.fields {
                if !model.field(column).is_some_and(|f| f.is_scalar()) {
                    problems.push(format!(
                        "relation '{}' uses unknown foreign key field '{}'",
                        location, column
                    ));
                }
            }

            for column in &target.references {
                if !target_model.field(column).is_some_and(|f| f.is_scalar()) {
                    problems.push(format!(
                        "relation '{}' references unknown field '{}.{}'",
                        location, target.model, column
                    ));
                }
            }
        }
    }
}

impl SchemaCatalog for Catalog {
    fn model(&self, name: &str) -> Option<&ModelDescriptor> {
        self.index.get(name).map(|i| &self.models[*i])
    }

    fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }
}
