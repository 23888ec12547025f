//! Role-keyed policies loaded from a YAML policy file.
//!
//! ```yaml
//! models:
//!   Post:
//!     omit: [internalNotes]
//!     roles:
//!       admin: {}
//!       member:
//!         access: { OR: [{ published: { equals: true } }, { authorId: { equals: $user.id } }] }
//!         update: { authorId: { equals: $user.id } }
//!         delete: false
//!     default:
//!       access: { published: { equals: true } }
//!       create: false
//! ```
//!
//! String values `$user.id`, `$user.role` and `$user.attrs.<key>` inside a
//! filter are replaced with the acting principal's values.

use crate::policy::{AccessPolicy, PolicyFilter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use warden_core::{ConfigError, Principal, SchemaCatalog};

const USER_ID: &str = "$user.id";
const USER_ROLE: &str = "$user.role";
const USER_ATTR_PREFIX: &str = "$user.attrs.";

/// A policy file: rules per model name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    #[serde(default)]
    pub models: BTreeMap<String, ModelRules>,
}

/// Rules for one model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelRules {
    /// Fields hidden from every role except the system principal.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub omit: Vec<String>,

    /// Rules per role name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub roles: BTreeMap<String, RoleRules>,

    /// Rules for roles not listed under `roles`. Without it such roles are
    /// denied everything once any role is listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<RoleRules>,
}

/// Rules applied to one role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub omit: Vec<String>,
}

impl RoleRules {
    fn deny_all() -> Self {
        Self {
            create: Some(false),
            access: Some(Value::Bool(false)),
            update: Some(Value::Bool(false)),
            delete: Some(Value::Bool(false)),
            omit: Vec::new(),
        }
    }
}

impl PolicyDocument {
    /// Load a policy file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse a policy document from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Check every rule against the schema. Returns the problems found.
    pub fn validate(&self, catalog: &dyn SchemaCatalog) -> Vec<String> {
        let mut problems = Vec::new();
        for (model, rules) in &self.models {
            let Some(descriptor) = catalog.model(model) else {
                problems.push(format!("policy for unknown model '{}'", model));
                continue;
            };

            let role_rules = rules
                .roles
                .iter()
                .map(|(role, r)| (role.as_str(), r))
                .chain(rules.default.iter().map(|r| ("default", r)));

            for field in &rules.omit {
                if !descriptor.has_field(field) {
                    problems.push(format!("'{}': omitted field '{}' does not exist", model, field));
                }
            }

            for (role, r) in role_rules {
                for field in &r.omit {
                    if !descriptor.has_field(field) {
                        problems.push(format!(
                            "'{}' role '{}': omitted field '{}' does not exist",
                            model, role, field
                        ));
                    }
                }
                for (name, filter) in [("access", &r.access), ("update", &r.update), ("delete", &r.delete)] {
                    match filter {
                        None | Some(Value::Bool(_)) => {}
                        Some(Value::Object(map)) => {
                            for key in map.keys() {
                                if !matches!(key.as_str(), "AND" | "OR" | "NOT") && !descriptor.has_field(key) {
                                    problems.push(format!(
                                        "'{}' role '{}': {} filter references unknown field '{}'",
                                        model, role, name, key
                                    ));
                                }
                            }
                        }
                        Some(other) => problems.push(format!(
                            "'{}' role '{}': {} filter must be a boolean or an object, got {}",
                            model, role, name, other
                        )),
                    }
                }
            }
        }
        problems
    }

    /// One [`DeclarativePolicy`] per model.
    pub fn into_policies(self) -> impl Iterator<Item = (String, DeclarativePolicy)> {
        self.models
            .into_iter()
            .map(|(model, rules)| (model, DeclarativePolicy::new(rules)))
    }
}

/// [`AccessPolicy`] backed by [`ModelRules`].
#[derive(Debug, Clone)]
pub struct DeclarativePolicy {
    rules: ModelRules,
}

impl DeclarativePolicy {
    pub fn new(rules: ModelRules) -> Self {
        Self { rules }
    }

    fn rules_for(&self, user: &Principal) -> Option<RoleRules> {
        if let Some(r) = self.rules.roles.get(&user.role) {
            return Some(r.clone());
        }
        if let Some(r) = &self.rules.default {
            return Some(r.clone());
        }
        if self.rules.roles.is_empty() {
            None
        } else {
            Some(RoleRules::deny_all())
        }
    }

    fn filter(&self, user: &Principal, pick: fn(&RoleRules) -> Option<&Value>) -> PolicyFilter {
        let Some(rules) = self.rules_for(user) else {
            return PolicyFilter::Unrestricted;
        };
        match pick(&rules) {
            Some(value) => PolicyFilter::from_value(substitute(value, user)),
            None => PolicyFilter::Unrestricted,
        }
    }
}

impl AccessPolicy for DeclarativePolicy {
    fn can_create(&self, user: &Principal, _data: &Value) -> bool {
        self.rules_for(user)
            .and_then(|r| r.create)
            .unwrap_or(true)
    }

    fn access_filter(&self, user: &Principal) -> PolicyFilter {
        self.filter(user, |r| r.access.as_ref())
    }

    fn update_filter(&self, user: &Principal, _current: Option<&Value>) -> PolicyFilter {
        self.filter(user, |r| r.update.as_ref())
    }

    fn delete_filter(&self, user: &Principal, _current: Option<&Value>) -> PolicyFilter {
        self.filter(user, |r| r.delete.as_ref())
    }

    fn omit_fields(&self, user: &Principal) -> BTreeSet<String> {
        let mut fields: BTreeSet<String> = self.rules.omit.iter().cloned().collect();
        if let Some(r) = self.rules_for(user) {
            fields.extend(r.omit);
        }
        fields
    }
}

/// Replace `$user.*` placeholders inside a filter value.
fn substitute(value: &Value, user: &Principal) -> Value {
    match value {
        Value::String(s) if s == USER_ID => Value::String(user.id.clone()),
        Value::String(s) if s == USER_ROLE => Value::String(user.role.clone()),
        Value::String(s) if s.starts_with(USER_ATTR_PREFIX) => user
            .attr(&s[USER_ATTR_PREFIX.len()..])
            .cloned()
            .unwrap_or(Value::Null),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, user)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, user)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use warden_core::Catalog;

    const POLICIES: &str = r#"
models:
  Post:
    omit: [internalNotes]
    roles:
      admin: {}
      member:
        access: { OR: [{ published: { equals: true } }, { authorId: { equals: $user.id } }] }
        update: { authorId: { equals: $user.id } }
        delete: false
        omit: [authorId]
    default:
      access: { tenantId: { equals: $user.attrs.tenant } }
      create: false
  Tag:
    roles:
      admin: {}
"#;

    fn post(doc: &PolicyDocument) -> DeclarativePolicy {
        DeclarativePolicy::new(doc.models["Post"].clone())
    }

    #[test]
    fn test_role_rules_with_placeholders() {
        let doc = PolicyDocument::from_yaml(POLICIES).unwrap();
        let policy = post(&doc);
        let member = Principal::new("u1", "member");

        let access = policy.access_filter(&member).into_predicate().into_value();
        assert_eq!(
            access,
            json!({"OR": [{"published": {"equals": true}}, {"authorId": {"equals": "u1"}}]})
        );
        assert!(policy.delete_filter(&member, None).is_denied());
        assert!(policy.can_create(&member, &json!({})));
        assert_eq!(
            policy.omit_fields(&member),
            BTreeSet::from(["authorId".to_string(), "internalNotes".to_string()])
        );
    }

    #[test]
    fn test_default_rules_apply_to_unlisted_roles() {
        let doc = PolicyDocument::from_yaml(POLICIES).unwrap();
        let policy = post(&doc);
        let guest = Principal::new("g1", "guest").with_attr("tenant", "t9");

        assert_eq!(
            policy.access_filter(&guest).into_predicate().into_value(),
            json!({"tenantId": {"equals": "t9"}})
        );
        assert!(!policy.can_create(&guest, &json!({})));
        assert!(policy.update_filter(&guest, None).is_unrestricted());
    }

    #[test]
    fn test_unlisted_role_without_default_is_denied() {
        let doc = PolicyDocument::from_yaml(POLICIES).unwrap();
        let tag = DeclarativePolicy::new(doc.models["Tag"].clone());
        let member = Principal::new("u1", "member");

        assert!(tag.access_filter(&member).is_denied());
        assert!(!tag.can_create(&member, &json!({})));
        assert!(tag.access_filter(&Principal::new("a", "admin")).is_unrestricted());
    }

    #[test]
    fn test_validate_against_schema() {
        let catalog = Catalog::from_yaml(
            r#"
models:
  - name: Post
    fields:
      - { name: id, id: true }
      - { name: published, type: Boolean }
      - { name: authorId }
"#,
        )
        .unwrap();
        let doc = PolicyDocument::from_yaml(POLICIES).unwrap();
        let problems = doc.validate(&catalog);

        assert!(problems.iter().any(|p| p.contains("unknown model 'Tag'")));
        assert!(problems.iter().any(|p| p.contains("'internalNotes'")));
        assert!(problems.iter().any(|p| p.contains("unknown field 'tenantId'")));
        assert!(!problems.iter().any(|p| p.contains("'OR'")));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, POLICIES.as_bytes()).unwrap();

        let doc = PolicyDocument::from_file(file.path()).unwrap();
        assert_eq!(doc.models.len(), 2);
        assert!(PolicyDocument::from_yaml("models: { Post: { bogus: 1 } }").is_err());
    }
}
