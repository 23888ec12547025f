//! Row-level security context handed to every store call.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use warden_core::Principal;

pub const USER_ID_VAR: &str = "app.user_id";
pub const USER_ROLE_VAR: &str = "app.user_role";
const ATTR_PREFIX: &str = "app.attr.";

/// Session variables describing the acting principal.
///
/// Built once per facade call or transaction and passed explicitly; the
/// store decides how to apply them (e.g. `SET LOCAL app.user_id = ...`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RlsContext {
    variables: BTreeMap<String, String>,
}

impl RlsContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables for `user`: id, role, and every string or numeric attribute.
    pub fn for_principal(user: &Principal) -> Self {
        let mut ctx = Self::new()
            .with(USER_ID_VAR, &user.id)
            .with(USER_ROLE_VAR, &user.role);
        for (key, value) in &user.attrs {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            ctx.variables.insert(format!("{}{}", ATTR_PREFIX, key), rendered);
        }
        ctx
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.get(USER_ID_VAR)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_context_from_principal() {
        let user = Principal::new("u1", "editor")
            .with_attr("tenant", "acme")
            .with_attr("level", 3)
            .with_attr("teams", json!(["a", "b"]));
        let ctx = RlsContext::for_principal(&user);
        assert_eq!(ctx.user_id(), Some("u1"));
        assert_eq!(ctx.get("app.user_role"), Some("editor"));
        assert_eq!(ctx.get("app.attr.tenant"), Some("acme"));
        assert_eq!(ctx.get("app.attr.level"), Some("3"));
        assert_eq!(ctx.get("app.attr.teams"), None);
    }
}
