//! Error types for query translation and execution.
//!
//! Errors are split by who is at fault:
//! - [`ValidationError`]: the request is malformed (400)
//! - [`PermissionError`]: the principal may not do this (403)
//! - [`StoreError`]: the persistence layer rejected the operation
//!
//! [`EngineError`] aggregates them at the facade boundary.

use crate::config::ConfigError;
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

/// Error type for request validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The kind of validation error.
    pub kind: ValidationErrorKind,
    /// Human-readable error message.
    pub message: String,
    /// Structured context (offending field, relation, model).
    pub data: Value,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: Value::Null,
        }
    }

    /// Attach structured context to the error.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    // =========================================================================
    // SCHEMA ERRORS
    // =========================================================================

    /// Create an unknown model error.
    pub fn unknown_model(model: &str) -> Self {
        Self::new(
            ValidationErrorKind::UnknownModel,
            format!("Model '{}' is not declared in the schema", model),
        )
        .with_data(json!({ "model": model }))
    }

    /// Create an unknown field error.
    pub fn unknown_field(model: &str, field: &str) -> Self {
        Self::new(
            ValidationErrorKind::UnknownField,
            format!("Field '{}' does not exist on model '{}'", field, model),
        )
        .with_data(json!({ "model": model, "field": field }))
    }

    /// Create an unknown relation error.
    pub fn unknown_relation(model: &str, relation: &str) -> Self {
        Self::new(
            ValidationErrorKind::UnknownRelation,
            format!("'{}' is not a relation of model '{}'", relation, model),
        )
        .with_data(json!({ "model": model, "relation": relation }))
    }

    // =========================================================================
    // QUERY ERRORS
    // =========================================================================

    /// Create an invalid filter value error.
    pub fn invalid_filter(field: &str, value: &str, reason: &str) -> Self {
        Self::new(
            ValidationErrorKind::InvalidFilter,
            format!("Invalid filter value '{}' for field '{}': {}", value, field, reason),
        )
        .with_data(json!({ "field": field, "value": value }))
    }

    /// Create a null-on-required-field error.
    pub fn null_not_allowed(model: &str, field: &str) -> Self {
        Self::new(
            ValidationErrorKind::NullNotAllowed,
            format!(
                "Field '{}' on model '{}' is not nullable and cannot be filtered with #NULL",
                field, model
            ),
        )
        .with_data(json!({ "model": model, "field": field }))
    }

    /// Create a relation-not-included error for a dotted field path.
    pub fn relation_not_included(relation: &str) -> Self {
        Self::new(
            ValidationErrorKind::RelationNotIncluded,
            format!(
                "Field selection references relation '{}' which is not included",
                relation
            ),
        )
        .with_data(json!({
            "relation": relation,
            "hint": format!("add '{}' to the include parameter", relation),
        }))
    }

    /// Create an invalid sort error.
    pub fn invalid_sort(field: &str, reason: &str) -> Self {
        Self::new(
            ValidationErrorKind::InvalidSort,
            format!("Cannot sort by '{}': {}", field, reason),
        )
        .with_data(json!({ "field": field }))
    }

    // =========================================================================
    // MUTATION ERRORS
    // =========================================================================

    /// Create an invalid payload error.
    pub fn invalid_payload(model: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ValidationErrorKind::InvalidPayload,
            format!("Invalid payload for model '{}': {}", model, reason),
        )
        .with_data(json!({ "model": model }))
    }

    /// Create an invalid record key error.
    pub fn invalid_key(model: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ValidationErrorKind::InvalidKey,
            format!("Invalid key for model '{}': {}", model, reason),
        )
        .with_data(json!({ "model": model }))
    }

    /// Create a nesting depth exceeded error.
    pub fn nesting_too_deep(model: &str, max_depth: usize) -> Self {
        Self::new(
            ValidationErrorKind::NestingTooDeep,
            format!(
                "Nested payload under model '{}' exceeds the maximum depth of {}",
                model, max_depth
            ),
        )
        .with_data(json!({ "model": model, "max_depth": max_depth }))
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Categories of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Model is not declared in the schema.
    UnknownModel,
    /// Field does not exist on the model.
    UnknownField,
    /// Name is not a relation of the model.
    UnknownRelation,
    /// Filter value could not be interpreted.
    InvalidFilter,
    /// `#NULL` used on a non-nullable field.
    NullNotAllowed,
    /// Dotted field path whose relation is missing from `include`.
    RelationNotIncluded,
    /// Sort field or order is not usable.
    InvalidSort,
    /// Mutation payload has the wrong shape.
    InvalidPayload,
    /// Record key does not match the primary key.
    InvalidKey,
    /// Nested payload or selection is too deep.
    NestingTooDeep,
}

impl ValidationErrorKind {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownModel => "unknown_model",
            Self::UnknownField => "unknown_field",
            Self::UnknownRelation => "unknown_relation",
            Self::InvalidFilter => "invalid_filter",
            Self::NullNotAllowed => "null_not_allowed",
            Self::RelationNotIncluded => "relation_not_included",
            Self::InvalidSort => "invalid_sort",
            Self::InvalidPayload => "invalid_payload",
            Self::InvalidKey => "invalid_key",
            Self::NestingTooDeep => "nesting_too_deep",
        }
    }
}

/// Error raised when an access policy rejects an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionError {
    pub kind: PermissionErrorKind,
    pub model: String,
    pub message: String,
}

impl PermissionError {
    fn new(kind: PermissionErrorKind, model: &str, message: String) -> Self {
        Self {
            kind,
            model: model.to_string(),
            message,
        }
    }

    /// Read access to the model is denied outright.
    pub fn access_denied(model: &str) -> Self {
        Self::new(
            PermissionErrorKind::AccessDenied,
            model,
            format!("Access to '{}' is denied", model),
        )
    }

    /// Creation is not permitted for this principal.
    pub fn create_denied(model: &str) -> Self {
        Self::new(
            PermissionErrorKind::CreateDenied,
            model,
            format!("Not allowed to create '{}' records", model),
        )
    }

    /// Update is not permitted for this principal.
    pub fn update_denied(model: &str) -> Self {
        Self::new(
            PermissionErrorKind::UpdateDenied,
            model,
            format!("Not allowed to update this '{}' record", model),
        )
    }

    /// Delete is not permitted for this principal.
    pub fn delete_denied(model: &str) -> Self {
        Self::new(
            PermissionErrorKind::DeleteDenied,
            model,
            format!("Not allowed to delete this '{}' record", model),
        )
    }

    /// The record exists but falls outside the principal's access filter.
    pub fn record_forbidden(model: &str) -> Self {
        Self::new(
            PermissionErrorKind::RecordForbidden,
            model,
            format!("Not allowed to access this '{}' record", model),
        )
    }
}

impl fmt::Display for PermissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PermissionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionErrorKind {
    AccessDenied,
    CreateDenied,
    UpdateDenied,
    DeleteDenied,
    RecordForbidden,
}

/// Classification of errors raised by the persistence executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Duplicate value for a unique key.
    UniqueViolation,
    /// The record addressed by the operation does not exist.
    NotFound,
    /// Foreign key constraint failed.
    ForeignKeyViolation,
    /// The operation timed out.
    Timeout,
    Other,
}

impl StoreErrorKind {
    /// Classify a persistence-engine error code.
    pub fn from_code(code: &str) -> Self {
        match code {
            "P2002" => Self::UniqueViolation,
            "P2025" | "P2001" | "P2018" => Self::NotFound,
            "P2003" | "P2014" => Self::ForeignKeyViolation,
            "P1008" | "P2024" => Self::Timeout,
            _ => Self::Other,
        }
    }
}

/// Error raised by the persistence executor.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    /// Native error code, if the store reported one.
    pub code: Option<String>,
    pub message: String,
    /// Field or constraint the error refers to.
    pub target: Option<String>,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            target: None,
        }
    }

    /// Build an error from a native error code, classifying it.
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            kind: StoreErrorKind::from_code(&code),
            code: Some(code),
            message: message.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// Primary fetch returned nothing.
    #[error("{model} not found")]
    NotFound { model: String, key: Option<String> },

    /// Duplicate unique key.
    #[error("unique constraint failed{}", target_suffix(.target))]
    Conflict {
        message: String,
        target: Option<String>,
    },

    /// Foreign key or relation constraint failed.
    #[error("constraint failed{}", target_suffix(.target))]
    Constraint {
        message: String,
        target: Option<String>,
    },

    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Unclassified store failure.
    #[error("store error: {0}")]
    Store(StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn target_suffix(target: &Option<String>) -> String {
    match target {
        Some(t) => format!(" on '{}'", t),
        None => String::new(),
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err.kind {
            StoreErrorKind::UniqueViolation => EngineError::Conflict {
                message: err.message,
                target: err.target,
            },
            StoreErrorKind::NotFound => EngineError::NotFound {
                model: err.target.unwrap_or_else(|| "record".to_string()),
                key: None,
            },
            StoreErrorKind::ForeignKeyViolation => EngineError::Constraint {
                message: err.message,
                target: err.target,
            },
            StoreErrorKind::Timeout => EngineError::Timeout(err.message),
            StoreErrorKind::Other => EngineError::Store(err),
        }
    }
}

impl EngineError {
    /// HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Validation(_) => 400,
            EngineError::Permission(_) => 403,
            EngineError::NotFound { .. } => 404,
            EngineError::Conflict { .. } => 409,
            EngineError::Constraint { .. } => 400,
            EngineError::Timeout(_) => 408,
            EngineError::Store(_) | EngineError::Config(_) | EngineError::Internal(_) => 500,
        }
    }

    /// Structured context safe to hand back to a caller.
    pub fn data(&self) -> Option<Value> {
        match self {
            EngineError::Validation(e) => {
                let mut data = json!({ "code": e.kind.code() });
                if let (Some(obj), Some(extra)) = (data.as_object_mut(), e.data.as_object()) {
                    for (k, v) in extra {
                        obj.insert(k.clone(), v.clone());
                    }
                }
                Some(data)
            }
            EngineError::Permission(e) => Some(json!({ "model": e.model })),
            EngineError::NotFound { model, key } => Some(json!({ "model": model, "key": key })),
            EngineError::Conflict { target, .. } | EngineError::Constraint { target, .. } => {
                target.as_ref().map(|t| json!({ "target": t }))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_codes_classify() {
        assert_eq!(StoreErrorKind::from_code("P2002"), StoreErrorKind::UniqueViolation);
        assert_eq!(StoreErrorKind::from_code("P2025"), StoreErrorKind::NotFound);
        assert_eq!(StoreErrorKind::from_code("P2003"), StoreErrorKind::ForeignKeyViolation);
        assert_eq!(StoreErrorKind::from_code("P1008"), StoreErrorKind::Timeout);
        assert_eq!(StoreErrorKind::from_code("XX000"), StoreErrorKind::Other);
    }

    #[test]
    fn test_status_codes() {
        let cases: Vec<(EngineError, u16)> = vec![
            (ValidationError::unknown_field("Post", "nope").into(), 400),
            (PermissionError::access_denied("Post").into(), 403),
            (StoreError::from_code("P2025", "gone").into(), 404),
            (StoreError::from_code("P2002", "dup").into(), 409),
            (StoreError::from_code("P2003", "fk").into(), 400),
            (StoreError::from_code("P1008", "slow").into(), 408),
            (StoreError::from_code("P9999", "boom").into(), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err);
        }
    }

    #[test]
    fn test_relation_not_included_carries_relation() {
        let err = ValidationError::relation_not_included("author");
        assert_eq!(err.kind.code(), "relation_not_included");
        assert_eq!(err.data["relation"], "author");
        assert!(err.data["hint"].as_str().unwrap().contains("author"));

        let engine: EngineError = err.into();
        let data = engine.data().unwrap();
        assert_eq!(data["code"], "relation_not_included");
        assert_eq!(data["relation"], "author");
    }

    #[test]
    fn test_conflict_message_names_target() {
        let err: EngineError = StoreError::from_code("P2002", "dup").with_target("email").into();
        assert_eq!(err.to_string(), "unique constraint failed on 'email'");
    }
}
