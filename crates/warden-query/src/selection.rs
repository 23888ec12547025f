//! Field selection and relation inclusion.
//!
//! A request either names fields (`fields=id,author.name`), which yields a
//! pure `select` tree, or names only relations (`include=author,tags`),
//! which yields `include` plus the root model's ACL `omit`. The two shapes
//! never appear together at the top level.

use crate::resolver::RelationshipResolver;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use warden_core::{EngineError, PermissionError, Principal, ValidationError};
use warden_core::config::SelectionConfig;
use warden_policy::{PolicyFilter, PolicyRegistry};

const INCLUDE_ALL: &str = "ALL";

/// Parsed `include` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IncludeSpec {
    #[default]
    None,
    /// Every relation the principal may read.
    All,
    /// Relation paths, possibly dotted (`author.company`).
    Paths(Vec<String>),
}

impl IncludeSpec {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return IncludeSpec::None;
        };
        if raw.eq_ignore_ascii_case(INCLUDE_ALL) {
            return IncludeSpec::All;
        }
        let paths = dedupe(raw);
        if paths.is_empty() {
            IncludeSpec::None
        } else {
            IncludeSpec::Paths(paths)
        }
    }

    /// Whether the relation path `path` is included.
    pub fn covers(&self, path: &str) -> bool {
        match self {
            IncludeSpec::None => false,
            IncludeSpec::All => true,
            IncludeSpec::Paths(paths) => paths.iter().any(|p| {
                p == path || (p.starts_with(path) && p[path.len()..].starts_with('.'))
            }),
        }
    }
}

/// Projection part of a store request.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Select(Map<String, Value>),
    Include {
        include: Map<String, Value>,
        omit: Map<String, Value>,
    },
}

impl Projection {
    /// Write the projection into store request arguments.
    pub fn apply(self, args: &mut Map<String, Value>) {
        match self {
            Projection::Select(select) => {
                args.insert("select".to_string(), Value::Object(select));
            }
            Projection::Include { include, omit } => {
                args.insert("include".to_string(), Value::Object(include));
                if !omit.is_empty() {
                    args.insert("omit".to_string(), Value::Object(omit));
                }
            }
        }
    }

    pub fn into_value(self) -> Value {
        let mut args = Map::new();
        self.apply(&mut args);
        Value::Object(args)
    }
}

/// Builds [`Projection`]s for one principal, applying each model's ACL.
pub struct SelectionBuilder<'a> {
    resolver: &'a RelationshipResolver,
    policies: &'a PolicyRegistry,
    max_depth: usize,
}

impl<'a> SelectionBuilder<'a> {
    pub fn new(resolver: &'a RelationshipResolver, policies: &'a PolicyRegistry) -> Self {
        Self {
            resolver,
            policies,
            max_depth: SelectionConfig::default().max_depth,
        }
    }

    /// Maximum number of relation hops in a field or include path.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Build the projection for `model` from the `fields` and `include`
    /// parameters.
    pub fn build(
        &self,
        model: &str,
        fields: Option<&str>,
        include: Option<&str>,
        user: &Principal,
    ) -> Result<Projection, EngineError> {
        self.resolver.model(model)?;
        let spec = IncludeSpec::parse(include);
        let fields = fields.map(str::trim).filter(|s| !s.is_empty());

        let Some(fields) = fields else {
            let include = self.include_tree(model, &spec, user)?;
            let omit = self.omit_map(model, user);
            return Ok(Projection::Include { include, omit });
        };

        let mut select = Map::new();
        for path in dedupe(fields) {
            let segments: Vec<&str> = path.split('.').map(str::trim).collect();
            if segments.iter().any(|s| s.is_empty()) {
                return Err(ValidationError::unknown_field(model, &path).into());
            }
            if segments.len() > self.max_depth + 1 {
                return Err(ValidationError::nesting_too_deep(model, self.max_depth).into());
            }
            self.insert_select(&mut select, model, &segments, "", &spec, user)?;
        }

        let included = self.include_tree(model, &spec, user)?;
        merge_includes(&mut select, included);
        self.fill_empty_selects(&mut select, model)?;

        tracing::trace!(model = %model, select = ?select, "Built selection");
        Ok(Projection::Select(select))
    }

    /// Insert one field path into a select tree.
    fn insert_select(
        &self,
        select: &mut Map<String, Value>,
        model: &str,
        segments: &[&str],
        prefix: &str,
        spec: &IncludeSpec,
        user: &Principal,
    ) -> Result<(), EngineError> {
        let name = segments[0];
        let field = self
            .resolver
            .model(model)?
            .field(name)
            .ok_or_else(|| ValidationError::unknown_field(model, name))?;

        if field.is_scalar() {
            if segments.len() > 1 {
                return Err(ValidationError::unknown_relation(model, name).into());
            }
            if !self.omitted(model, user).contains(name) {
                select.entry(name.to_string()).or_insert(Value::Bool(true));
            }
            return Ok(());
        }

        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", prefix, name)
        };
        // Only the top-level relation is gated; deeper hops ride on it.
        if prefix.is_empty() && !spec.covers(&path) {
            return Err(ValidationError::relation_not_included(&path).into());
        }

        let target = self.resolver.target(model, name)?;
        let is_list = field.is_list;

        if segments.len() == 1 {
            if !select.contains_key(name) {
                let args = self
                    .relation_args(&target, is_list, user)
                    .ok_or_else(|| PermissionError::access_denied(&target))?;
                select.insert(name.to_string(), collapse(args));
            }
            return Ok(());
        }

        let has_select = matches!(select.get(name), Some(Value::Object(node)) if node.contains_key("select"));
        if !has_select {
            let mut node = self
                .relation_args(&target, is_list, user)
                .ok_or_else(|| PermissionError::access_denied(&target))?;
            // Omitted fields are left out of the nested select instead.
            node.remove("omit");
            node.insert("select".to_string(), Value::Object(Map::new()));
            select.insert(name.to_string(), Value::Object(node));
        }

        if let Some(Value::Object(node)) = select.get_mut(name) {
            if let Some(Value::Object(nested)) = node.get_mut("select") {
                self.insert_select(nested, &target, &segments[1..], &path, spec, user)?;
            }
        }
        Ok(())
    }

    /// Include tree for the legacy `include`/`omit` shape.
    fn include_tree(
        &self,
        model: &str,
        spec: &IncludeSpec,
        user: &Principal,
    ) -> Result<Map<String, Value>, EngineError> {
        let mut tree = Map::new();
        match spec {
            IncludeSpec::None => {}
            IncludeSpec::All => {
                for field in self.resolver.model(model)?.relations() {
                    let target = self.resolver.target(model, &field.name)?;
                    match self.relation_args(&target, field.is_list, user) {
                        Some(args) => {
                            tree.insert(field.name.clone(), Value::Object(args));
                        }
                        None => {
                            tracing::debug!(
                                model = %model,
                                relation = %field.name,
                                "Skipping relation denied to principal"
                            );
                        }
                    }
                }
            }
            IncludeSpec::Paths(paths) => {
                for path in paths {
                    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
                    if segments.len() > self.max_depth {
                        return Err(ValidationError::nesting_too_deep(model, self.max_depth).into());
                    }
                    self.insert_include(&mut tree, model, &segments, user)?;
                }
            }
        }
        Ok(collapse_tree(tree))
    }

    fn insert_include(
        &self,
        tree: &mut Map<String, Value>,
        model: &str,
        segments: &[&str],
        user: &Principal,
    ) -> Result<(), EngineError> {
        let name = segments[0];
        let field = self.resolver.relation(model, name)?;
        let target = self.resolver.target(model, name)?;

        if !tree.contains_key(name) {
            let args = self
                .relation_args(&target, field.is_list, user)
                .ok_or_else(|| PermissionError::access_denied(&target))?;
            tree.insert(name.to_string(), Value::Object(args));
        }

        if segments.len() > 1 {
            if let Some(Value::Object(node)) = tree.get_mut(name) {
                let nested = node
                    .entry("include".to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(nested) = nested {
                    self.insert_include(nested, &target, &segments[1..], user)?;
                }
            }
        }
        Ok(())
    }

    /// Arguments for a whole included relation: the target's omitted fields
    /// and, for list relations, its access filter. `None` when the target
    /// denies read access.
    fn relation_args(&self, target: &str, is_list: bool, user: &Principal) -> Option<Map<String, Value>> {
        let access = self.policies.get_policy(target).access_filter(user);
        let mut args = Map::new();
        match access {
            PolicyFilter::Deny => return None,
            PolicyFilter::Where(predicate) if is_list => {
                args.insert("where".to_string(), predicate.into_value());
            }
            _ => {}
        }
        let omit = self.omit_map(target, user);
        if !omit.is_empty() {
            args.insert("omit".to_string(), Value::Object(omit));
        }
        Some(args)
    }

    fn omitted(&self, model: &str, user: &Principal) -> BTreeSet<String> {
        self.policies.get_policy(model).omit_fields(user)
    }

    /// `{field: true}` for every omitted scalar of `model`.
    pub fn omit_map(&self, model: &str, user: &Principal) -> Map<String, Value> {
        let descriptor = self.resolver.catalog().model(model);
        self.omitted(model, user)
            .into_iter()
            .filter(|f| descriptor.and_then(|m| m.field(f)).is_some_and(|f| f.is_scalar()))
            .map(|f| (f, Value::Bool(true)))
            .collect()
    }

    /// A select that ended up empty (every field omitted) selects the
    /// primary key instead.
    fn fill_empty_selects(&self, select: &mut Map<String, Value>, model: &str) -> Result<(), EngineError> {
        for (name, value) in select.iter_mut() {
            let Value::Object(node) = value else {
                continue;
            };
            let Some(Value::Object(nested)) = node.get_mut("select") else {
                continue;
            };
            let target = self.resolver.target(model, name)?;
            self.fill_empty_selects(nested, &target)?;
        }

        if select.is_empty() {
            let descriptor = self.resolver.model(model)?;
            for pk in descriptor.primary_key.fields() {
                select.insert(pk.to_string(), Value::Bool(true));
            }
        }
        Ok(())
    }
}

/// Comma-separated list, trimmed, without blanks or repeats, first
/// occurrence order.
fn dedupe(raw: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && seen.insert(s.to_string()))
        .map(str::to_string)
        .collect()
}

/// Relation arguments with nothing in them become `true`.
fn collapse(args: Map<String, Value>) -> Value {
    if args.is_empty() {
        Value::Bool(true)
    } else {
        Value::Object(args)
    }
}

fn collapse_tree(tree: Map<String, Value>) -> Map<String, Value> {
    tree.into_iter()
        .map(|(name, node)| {
            let node = match node {
                Value::Object(mut args) => {
                    if let Some(Value::Object(nested)) = args.remove("include") {
                        args.insert("include".to_string(), Value::Object(collapse_tree(nested)));
                    }
                    collapse(args)
                }
                other => other,
            };
            (name, node)
        })
        .collect()
}

/// Add included relations that no field path selected. For relations that
/// already carry a nested select, the include's own nested relations are
/// merged into that select.
fn merge_includes(select: &mut Map<String, Value>, included: Map<String, Value>) {
    for (name, node) in included {
        match select.get_mut(&name) {
            None => {
                select.insert(name, node);
            }
            Some(Value::Object(existing)) => {
                let Value::Object(mut node) = node else {
                    continue;
                };
                let Some(Value::Object(nested)) = node.remove("include") else {
                    continue;
                };
                if let Some(Value::Object(inner)) = existing.get_mut("select") {
                    merge_includes(inner, nested);
                }
            }
            Some(_) => {}
        }
    }
}
