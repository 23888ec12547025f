//! Warden access policies.
//!
//! Every model may carry an [`AccessPolicy`]: optional functions deciding
//! which rows a principal sees, which rows it may update or delete, which
//! fields are hidden from it, and whether it may create records at all.
//!
//! Policies come from two places:
//! - [`FnPolicy`]: closures registered in code
//! - [`DeclarativePolicy`]: role-keyed rules loaded from a YAML policy file
//!
//! The [`PolicyRegistry`] resolves a model name to a [`ModelPolicy`]. A model
//! without an entry is the explicit [`ModelPolicy::Unrestricted`] variant.

pub mod declarative;
pub mod policy;
pub mod registry;

pub use declarative::{DeclarativePolicy, ModelRules, PolicyDocument, RoleRules};
pub use policy::{AccessPolicy, FnPolicy, PolicyFilter};
pub use registry::{ModelPolicy, PolicyRegistry};
