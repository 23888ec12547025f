//! Model name to policy resolution.

use crate::declarative::PolicyDocument;
use crate::policy::{AccessPolicy, PolicyFilter};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use warden_core::Principal;

/// The policy in force for one model.
///
/// The system principal passes every check regardless of variant.
#[derive(Clone, Default)]
pub enum ModelPolicy {
    /// No policy registered for the model.
    #[default]
    Unrestricted,
    Restricted(Arc<dyn AccessPolicy>),
}

impl ModelPolicy {
    fn active(&self, user: &Principal) -> Option<&Arc<dyn AccessPolicy>> {
        match self {
            ModelPolicy::Restricted(policy) if !user.is_system() => Some(policy),
            _ => None,
        }
    }

    pub fn can_create(&self, user: &Principal, data: &Value) -> bool {
        self.active(user).is_none_or(|p| p.can_create(user, data))
    }

    pub fn access_filter(&self, user: &Principal) -> PolicyFilter {
        self.active(user)
            .map(|p| p.access_filter(user))
            .unwrap_or_default()
    }

    pub fn update_filter(&self, user: &Principal, current: Option<&Value>) -> PolicyFilter {
        self.active(user)
            .map(|p| p.update_filter(user, current))
            .unwrap_or_default()
    }

    pub fn delete_filter(&self, user: &Principal, current: Option<&Value>) -> PolicyFilter {
        self.active(user)
            .map(|p| p.delete_filter(user, current))
            .unwrap_or_default()
    }

    pub fn omit_fields(&self, user: &Principal) -> BTreeSet<String> {
        self.active(user)
            .map(|p| p.omit_fields(user))
            .unwrap_or_default()
    }
}

impl fmt::Debug for ModelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelPolicy::Unrestricted => write!(f, "Unrestricted"),
            ModelPolicy::Restricted(_) => write!(f, "Restricted(..)"),
        }
    }
}

/// Policies keyed by model name. Populated at startup, read-only afterwards.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<dyn AccessPolicy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the policy of `model`.
    pub fn register(&mut self, model: impl Into<String>, policy: impl AccessPolicy + 'static) {
        self.register_arc(model, Arc::new(policy));
    }

    pub fn register_arc(&mut self, model: impl Into<String>, policy: Arc<dyn AccessPolicy>) {
        let model = model.into();
        if self.policies.insert(model.clone(), policy).is_some() {
            tracing::debug!(model = %model, "Replaced access policy");
        }
    }

    /// Build a registry holding one declarative policy per model of `doc`.
    pub fn from_document(doc: PolicyDocument) -> Self {
        let mut registry = Self::new();
        for (model, policy) in doc.into_policies() {
            registry.register(model, policy);
        }
        registry
    }

    /// The policy for `model`.
    pub fn get_policy(&self, model: &str) -> ModelPolicy {
        self.policies
            .get(model)
            .cloned()
            .map(ModelPolicy::Restricted)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut models: Vec<&String> = self.policies.keys().collect();
        models.sort();
        f.debug_struct("PolicyRegistry").field("models", &models).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FnPolicy;
    use serde_json::json;

    #[test]
    fn test_unregistered_model_is_unrestricted() {
        let registry = PolicyRegistry::new();
        assert!(matches!(registry.get_policy("Post"), ModelPolicy::Unrestricted));
    }

    #[test]
    fn test_system_principal_bypasses_policy() {
        let mut registry = PolicyRegistry::new();
        registry.register(
            "Post",
            FnPolicy::new()
                .with_access_filter(|_| PolicyFilter::Deny)
                .with_can_create(|_, _| false)
                .with_omitted(["secret"]),
        );

        let policy = registry.get_policy("Post");
        let member = Principal::new("u1", "member");
        assert!(policy.access_filter(&member).is_denied());
        assert!(!policy.can_create(&member, &json!({})));

        let system = Principal::system();
        assert!(policy.access_filter(&system).is_unrestricted());
        assert!(policy.can_create(&system, &json!({})));
        assert!(policy.omit_fields(&system).is_empty());
    }

    #[test]
    fn test_from_document() {
        let doc = PolicyDocument::from_yaml("models:\n  Post:\n    omit: [secret]\n").unwrap();
        let registry = PolicyRegistry::from_document(doc);
        assert_eq!(registry.len(), 1);
        let omitted = registry
            .get_policy("Post")
            .omit_fields(&Principal::new("u1", "member"));
        assert!(omitted.contains("secret"));
    }
}
