//! Sort order and page bounds.

use crate::resolver::RelationshipResolver;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use warden_core::config::PaginationConfig;
use warden_core::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Parse `asc`/`desc` (any case). A missing or blank order is `asc`.
    pub fn parse(raw: Option<&str>) -> Result<Self, ValidationError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(SortOrder::Asc),
            Some(s) if s.eq_ignore_ascii_case("asc") => Ok(SortOrder::Asc),
            Some(s) if s.eq_ignore_ascii_case("desc") => Ok(SortOrder::Desc),
            Some(s) => Err(ValidationError::invalid_sort(s, "sort order must be 'asc' or 'desc'")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build an `orderBy` clause. `sort_by` is a scalar of `model` or a dotted
/// path through singular relations ending in a scalar.
pub fn order_by(
    resolver: &RelationshipResolver,
    model: &str,
    sort_by: &str,
    order: SortOrder,
) -> Result<Value, ValidationError> {
    let segments: Vec<&str> = sort_by.split('.').map(str::trim).collect();
    let (hops, last) = segments.split_at(segments.len() - 1);
    let last = last[0];
    if last.is_empty() || hops.iter().any(|s| s.is_empty()) {
        return Err(ValidationError::invalid_sort(sort_by, "malformed field path"));
    }

    let resolved = resolver
        .resolve_path(model, hops)
        .map_err(|_| ValidationError::invalid_sort(sort_by, "unknown relation in path"))?;
    if let Some(hop) = resolved.iter().find(|h| h.is_list) {
        return Err(ValidationError::invalid_sort(
            sort_by,
            &format!("'{}' is a list relation", hop.name),
        ));
    }

    let owner = resolved.last().map(|h| h.target.as_str()).unwrap_or(model);
    match resolver.model(owner)?.field(last) {
        Some(f) if f.is_scalar() => {}
        Some(_) => return Err(ValidationError::invalid_sort(sort_by, "not a scalar field")),
        None => return Err(ValidationError::invalid_sort(sort_by, "unknown field")),
    }

    let mut clause = Value::String(order.as_str().to_string());
    for name in segments.iter().rev() {
        let mut map = Map::new();
        map.insert(name.to_string(), clause);
        clause = Value::Object(map);
    }
    Ok(clause)
}

/// Resolved `take`/`skip` of a list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub take: u64,
    pub skip: u64,
}

impl Page {
    /// Clamp the requested limit against the pagination config.
    pub fn new(config: &PaginationConfig, limit: Option<u64>, offset: Option<u64>) -> Self {
        Self {
            take: config.clamp(limit),
            skip: offset.unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_sort_order_parse() {
        assert_eq!(SortOrder::parse(None).unwrap(), SortOrder::Asc);
        assert_eq!(SortOrder::parse(Some("DESC")).unwrap(), SortOrder::Desc);
        assert_eq!(SortOrder::parse(Some(" ")).unwrap(), SortOrder::Asc);
        assert!(SortOrder::parse(Some("sideways")).is_err());
    }

    #[test]
    fn test_order_by_scalar_and_relation_path() {
        let resolver = RelationshipResolver::new(fixtures::catalog());
        assert_eq!(
            order_by(&resolver, "Post", "title", SortOrder::Desc).unwrap(),
            json!({"title": "desc"})
        );
        assert_eq!(
            order_by(&resolver, "Post", "author.company.name", SortOrder::Asc).unwrap(),
            json!({"author": {"company": {"name": "asc"}}})
        );
    }

    #[test]
    fn test_order_by_rejects_lists_and_unknowns() {
        let resolver = RelationshipResolver::new(fixtures::catalog());
        for field in ["tags.label", "nope", "author", "author.nope"] {
            let err = order_by(&resolver, "Post", field, SortOrder::Asc).unwrap_err();
            assert_eq!(err.kind.code(), "invalid_sort", "{}", field);
        }
    }

    #[test]
    fn test_page_clamps_limit() {
        let config = PaginationConfig { default_limit: 25, max_limit: 100 };
        assert_eq!(Page::new(&config, Some(500), Some(10)), Page { take: 100, skip: 10 });
        assert_eq!(Page::new(&config, None, None), Page { take: 25, skip: 0 });
    }
}
