//! Shared building blocks for the Warden query translation engine.
//!
//! - [`schema`]: model/field descriptors and the [`SchemaCatalog`] seam
//! - [`config`]: engine configuration loaded from YAML
//! - [`error`]: the validation / permission / store error taxonomy
//! - [`Principal`], [`Predicate`], [`RecordKey`]: request-scoped values

pub mod config;
pub mod error;
pub mod predicate;
pub mod principal;
pub mod schema;

pub use config::{ConfigError, EngineConfig};
pub use error::{
    EngineError, PermissionError, PermissionErrorKind, StoreError, StoreErrorKind,
    ValidationError, ValidationErrorKind,
};
pub use predicate::{Predicate, RecordKey};
pub use principal::Principal;
pub use schema::{
    Catalog, FieldDescriptor, FieldKind, ModelDescriptor, PrimaryKey, RelationTarget,
    RelationshipConfig, ScalarType, SchemaCatalog,
};
