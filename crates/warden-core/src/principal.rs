//! The acting user of a request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of the built-in system principal.
pub const SYSTEM_PRINCIPAL_ID: &str = "system";
/// Role of the built-in system principal.
pub const SYSTEM_ROLE: &str = "application";

/// The user on whose behalf an operation runs.
///
/// Access policies receive the principal verbatim; `attrs` carries whatever
/// extra claims the authentication layer resolved (tenant, team, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            attrs: Map::new(),
        }
    }

    /// The application principal. It bypasses every access policy.
    pub fn system() -> Self {
        Self::new(SYSTEM_PRINCIPAL_ID, SYSTEM_ROLE)
    }

    pub fn is_system(&self) -> bool {
        self.id == SYSTEM_PRINCIPAL_ID && self.role == SYSTEM_ROLE
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }
}

impl Default for Principal {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_system() {
        let p = Principal::default();
        assert!(p.is_system());
        assert_eq!(p.id, "system");
        assert_eq!(p.role, "application");
    }

    #[test]
    fn test_system_id_with_other_role_is_not_system() {
        assert!(!Principal::new("system", "user").is_system());
    }
}
