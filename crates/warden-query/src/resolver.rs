//! Memoized relation lookups over a [`SchemaCatalog`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use warden_core::schema::{RELATIONSHIP_CONFIG_DEPTH, collect_relationships};
use warden_core::{FieldDescriptor, ModelDescriptor, RelationshipConfig, SchemaCatalog, ValidationError};

/// Answers relation questions for the translators.
///
/// Relationship configs are built lazily and cached per model name. Paths
/// deeper than the cached configs are resolved hop by hop against the
/// catalog.
pub struct RelationshipResolver {
    catalog: Arc<dyn SchemaCatalog>,
    cache: RwLock<HashMap<String, Arc<Vec<RelationshipConfig>>>>,
}

/// One hop of a resolved relation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationHop {
    pub name: String,
    pub source: String,
    pub target: String,
    pub is_list: bool,
}

impl RelationshipResolver {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self {
            catalog,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &dyn SchemaCatalog {
        self.catalog.as_ref()
    }

    /// Model descriptor, or an `unknown_model` error.
    pub fn model(&self, name: &str) -> Result<&ModelDescriptor, ValidationError> {
        self.catalog
            .model(name)
            .ok_or_else(|| ValidationError::unknown_model(name))
    }

    /// Relationship configs of `model`, two levels deep. Cached.
    pub fn relationships(&self, model: &str) -> Arc<Vec<RelationshipConfig>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(configs) = cache.get(model) {
                return Arc::clone(configs);
            }
        }

        let configs = Arc::new(self.catalog.build_relationships(model));
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(model.to_string(), Arc::clone(&configs));
        }
        configs
    }

    /// Relations of `model` resolved to `depth` levels, skipping models
    /// already on the current path.
    pub fn walk(&self, model: &str, depth: usize) -> Vec<RelationshipConfig> {
        if depth == 0 {
            return Vec::new();
        }
        if depth <= RELATIONSHIP_CONFIG_DEPTH {
            let mut configs = (*self.relationships(model)).clone();
            truncate(&mut configs, depth);
            return configs;
        }
        let mut visited = HashSet::new();
        collect_relationships(self.catalog.as_ref(), model, depth, &mut visited)
    }

    /// The relation field `relation` of `model`.
    pub fn relation(&self, model: &str, relation: &str) -> Result<&FieldDescriptor, ValidationError> {
        self.model(model)?
            .relation(relation)
            .ok_or_else(|| ValidationError::unknown_relation(model, relation))
    }

    pub fn is_list_relation(&self, model: &str, relation: &str) -> bool {
        match self.relationships(model).iter().find(|c| c.name == relation) {
            Some(config) => config.is_list,
            None => self.catalog.is_list_relation(model, relation),
        }
    }

    /// Local foreign-key columns and the target columns they reference.
    pub fn foreign_key(&self, model: &str, relation: &str) -> Option<(Vec<String>, Vec<String>)> {
        self.relationships(model)
            .iter()
            .find(|c| c.name == relation)
            .map(|c| (c.foreign_key.clone(), c.references.clone()))
    }

    /// Target model name of `relation` on `model`.
    pub fn target(&self, model: &str, relation: &str) -> Result<String, ValidationError> {
        let field = self.relation(model, relation)?;
        field
            .relation_target()
            .map(|t| t.model.clone())
            .ok_or_else(|| ValidationError::unknown_relation(model, relation))
    }

    /// Resolve a chain of relation names starting at `model`. Every hop is
    /// looked up in the catalog, so any depth works.
    pub fn resolve_path(&self, model: &str, path: &[&str]) -> Result<Vec<RelationHop>, ValidationError> {
        let mut hops = Vec::with_capacity(path.len());
        let mut current = model.to_string();
        for name in path {
            let field = self.relation(&current, name)?;
            let target = self.target(&current, name)?;
            hops.push(RelationHop {
                name: name.to_string(),
                source: current.clone(),
                target: target.clone(),
                is_list: field.is_list,
            });
            current = target;
        }
        Ok(hops)
    }
}

fn truncate(configs: &mut [RelationshipConfig], depth: usize) {
    for config in configs.iter_mut() {
        if depth <= 1 {
            config.children.clear();
        } else {
            truncate(&mut config.children, depth - 1);
        }
    }
}
