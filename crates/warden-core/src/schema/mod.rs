//! Schema metadata.
//!
//! The engine consumes schema metadata through the [`SchemaCatalog`] trait.
//! [`Catalog`] is the in-process implementation, built from a YAML/JSON schema
//! document and validated once at startup.

mod catalog;
mod descriptor;

pub use catalog::Catalog;
pub use descriptor::{
    FieldDescriptor, FieldKind, ModelDescriptor, PrimaryKey, RelationTarget, RelationshipConfig,
    ScalarType,
};

use std::collections::HashSet;

/// Depth of relationship configs built by [`SchemaCatalog::build_relationships`]:
/// the model's relations plus the targets' first-level relations.
pub const RELATIONSHIP_CONFIG_DEPTH: usize = 2;

/// Read-only access to model metadata.
pub trait SchemaCatalog: Send + Sync {
    /// Look up a model by name.
    fn model(&self, name: &str) -> Option<&ModelDescriptor>;

    /// Names of all models, in declaration order.
    fn model_names(&self) -> Vec<&str>;

    fn fields(&self, name: &str) -> Option<&[FieldDescriptor]> {
        self.model(name).map(|m| m.fields.as_slice())
    }

    fn scalar_fields(&self, name: &str) -> Vec<&FieldDescriptor> {
        self.model(name)
            .map(|m| m.scalar_fields().collect())
            .unwrap_or_default()
    }

    fn primary_key(&self, name: &str) -> Option<&PrimaryKey> {
        self.model(name).map(|m| &m.primary_key)
    }

    fn relations(&self, name: &str) -> Vec<&FieldDescriptor> {
        self.model(name)
            .map(|m| m.relations().collect())
            .unwrap_or_default()
    }

    fn is_list_relation(&self, name: &str, field: &str) -> bool {
        self.model(name)
            .and_then(|m| m.relation(field))
            .is_some_and(|f| f.is_list)
    }

    /// Relationship configs for a model, two levels deep.
    fn build_relationships(&self, name: &str) -> Vec<RelationshipConfig> {
        let mut visited = HashSet::new();
        collect_relationships(self, name, RELATIONSHIP_CONFIG_DEPTH, &mut visited)
    }
}

/// Walk relations of `model` up to `depth` levels. A model already on the
/// current path is not expanded again.
pub fn collect_relationships<C: SchemaCatalog + ?Sized>(
    catalog: &C,
    model: &str,
    depth: usize,
    visited: &mut HashSet<String>,
) -> Vec<RelationshipConfig> {
    if depth == 0 || !visited.insert(model.to_string()) {
        return Vec::new();
    }

    let configs = catalog
        .relations(model)
        .into_iter()
        .filter_map(|field| {
            let mut config = RelationshipConfig::from_field(field)?;
            config.children = collect_relationships(catalog, &config.target, depth - 1, visited);
            Some(config)
        })
        .collect();

    visited.remove(model);
    configs
}
