//! Create/update payload transformation.
//!
//! Payloads arrive as flat JSON objects. Relation-valued keys are rewritten
//! from their shape alone:
//!
//! - a foreign-key scalar becomes `{relation: {connect: {ref: value}}}`
//! - an object holding only the target's primary key becomes `connect`,
//!   any other object becomes a nested `create`
//! - a list on a list relation is split into `connect` and `create` arrays
//! - `null` on update becomes `disconnect` (singular) or `set: []` (list)
//!
//! The caller's payload is only read; the result is an independent copy.

use crate::resolver::RelationshipResolver;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use warden_core::config::MutationConfig;
use warden_core::{FieldDescriptor, ModelDescriptor, PrimaryKey, Principal, RecordKey, ValidationError};
use warden_policy::PolicyRegistry;

/// Keys that mark a value as an already-shaped relation operation.
const RELATION_OPS: [&str; 11] = [
    "connect",
    "connectOrCreate",
    "create",
    "createMany",
    "delete",
    "deleteMany",
    "disconnect",
    "set",
    "update",
    "updateMany",
    "upsert",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Create,
    Update,
}

/// Rewrites mutation payloads for one principal.
pub struct MutationTransformer<'a> {
    resolver: &'a RelationshipResolver,
    policies: &'a PolicyRegistry,
    config: &'a MutationConfig,
}

impl<'a> MutationTransformer<'a> {
    pub fn new(
        resolver: &'a RelationshipResolver,
        policies: &'a PolicyRegistry,
        config: &'a MutationConfig,
    ) -> Self {
        Self {
            resolver,
            policies,
            config,
        }
    }

    /// Transform a create payload. Fields the principal may not see are
    /// dropped at every nesting level.
    pub fn create(&self, model: &str, data: &Value, user: &Principal) -> Result<Map<String, Value>, ValidationError> {
        let data = as_object(model, data)?;
        self.transform(model, data, Mode::Create, 0, user)
    }

    /// Transform an update payload for the record `key`. System-managed
    /// fields are dropped.
    pub fn update(
        &self,
        model: &str,
        key: &RecordKey,
        data: &Value,
        user: &Principal,
    ) -> Result<Map<String, Value>, ValidationError> {
        let descriptor = self.resolver.model(model)?;
        key.columns(&descriptor.primary_key, model)?;
        let data = as_object(model, data)?;
        self.transform(model, data, Mode::Update, 0, user)
    }

    fn transform(
        &self,
        model: &str,
        data: &Map<String, Value>,
        mode: Mode,
        depth: usize,
        user: &Principal,
    ) -> Result<Map<String, Value>, ValidationError> {
        if depth > self.config.max_depth {
            return Err(ValidationError::nesting_too_deep(model, self.config.max_depth));
        }
        let descriptor = self.resolver.model(model)?;
        let omitted = match mode {
            Mode::Create => self.policies.get_policy(model).omit_fields(user),
            Mode::Update => BTreeSet::new(),
        };

        let mut out = Map::new();
        // Foreign-key scalars grouped by the relation that owns them.
        let mut foreign_keys: Vec<(&FieldDescriptor, Map<String, Value>)> = Vec::new();

        for (key, value) in data {
            if mode == Mode::Update && self.config.system_managed_fields.contains(key) {
                continue;
            }
            if omitted.contains(key) {
                continue;
            }
            let field = descriptor
                .field(key)
                .ok_or_else(|| ValidationError::unknown_field(model, key))?;

            if field.is_relation() {
                if let Some(op) = self.relation_value(descriptor, field, value, mode, depth, user)? {
                    out.insert(key.clone(), op);
                }
                continue;
            }

            match descriptor.foreign_key_owner(key) {
                Some(owner) if !data.contains_key(&owner.name) => {
                    match foreign_keys.iter_mut().find(|(f, _)| f.name == owner.name) {
                        Some((_, columns)) => {
                            columns.insert(key.clone(), value.clone());
                        }
                        None => {
                            let mut columns = Map::new();
                            columns.insert(key.clone(), value.clone());
                            foreign_keys.push((owner, columns));
                        }
                    }
                }
                // An explicit relation value wins over its foreign key.
                Some(_) => {}
                None => {
                    out.insert(key.clone(), value.clone());
                }
            }
        }

        for (relation, columns) in foreign_keys {
            self.fold_foreign_key(relation, columns, mode, &mut out)?;
        }
        Ok(out)
    }

    /// Rewrite foreign-key scalars into a relation operation.
    fn fold_foreign_key(
        &self,
        relation: &FieldDescriptor,
        columns: Map<String, Value>,
        mode: Mode,
        out: &mut Map<String, Value>,
    ) -> Result<(), ValidationError> {
        let Some(target) = relation.relation_target() else {
            return Ok(());
        };

        if columns.values().all(Value::is_null) {
            if mode == Mode::Update {
                out.insert(relation.name.clone(), op("disconnect", Value::Bool(true)));
            }
            return Ok(());
        }

        let complete = target.fields.iter().all(|c| columns.get(c).is_some_and(|v| !v.is_null()));
        if !complete {
            // Partial composite key: leave the scalars for the store to judge.
            out.extend(columns);
            return Ok(());
        }

        let mut reference = Map::new();
        for (column, referenced) in target.fields.iter().zip(&target.references) {
            if let Some(v) = columns.get(column) {
                reference.insert(referenced.clone(), v.clone());
            }
        }
        let connect = if target.references.len() > 1 {
            let mut compound = Map::new();
            compound.insert(target.references.join("_"), Value::Object(reference));
            compound
        } else {
            reference
        };
        out.insert(relation.name.clone(), op("connect", Value::Object(connect)));
        Ok(())
    }

    /// Rewrite the value of a relation field. `None` drops the key.
    fn relation_value(
        &self,
        model: &ModelDescriptor,
        field: &FieldDescriptor,
        value: &Value,
        mode: Mode,
        depth: usize,
        user: &Principal,
    ) -> Result<Option<Value>, ValidationError> {
        if is_relation_op(value) {
            return Ok(Some(value.clone()));
        }
        let target_name = self.resolver.target(&model.name, &field.name)?;
        let target = self.resolver.model(&target_name)?;

        if field.is_list {
            let items: Vec<&Value> = match value {
                Value::Null => {
                    return Ok((mode == Mode::Update).then(|| op("set", Value::Array(Vec::new()))));
                }
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            if items.is_empty() {
                return Ok((mode == Mode::Update).then(|| op("set", Value::Array(Vec::new()))));
            }

            let mut connect = Vec::new();
            let mut create = Vec::new();
            for item in items {
                match item {
                    Value::Object(obj) if is_key_only(obj, &target.primary_key) => {
                        connect.push(Value::Object(unique_reference(obj, target)?));
                    }
                    Value::Object(obj) => {
                        create.push(Value::Object(self.transform(
                            &target.name,
                            obj,
                            Mode::Create,
                            depth + 1,
                            user,
                        )?));
                    }
                    Value::String(_) | Value::Number(_) => {
                        connect.push(Value::Object(scalar_reference(item, target)?));
                    }
                    other => {
                        return Err(ValidationError::invalid_payload(
                            &model.name,
                            format!("'{}' items must be objects or keys, got {}", field.name, other),
                        ));
                    }
                }
            }

            let mut ops = Map::new();
            if !connect.is_empty() {
                ops.insert("connect".to_string(), Value::Array(connect));
            }
            if !create.is_empty() {
                ops.insert("create".to_string(), Value::Array(create));
            }
            return Ok(Some(Value::Object(ops)));
        }

        match value {
            Value::Null => Ok((mode == Mode::Update).then(|| op("disconnect", Value::Bool(true)))),
            Value::Object(obj) if is_key_only(obj, &target.primary_key) => {
                Ok(Some(op("connect", Value::Object(unique_reference(obj, target)?))))
            }
            Value::Object(obj) => {
                let nested = self.transform(&target.name, obj, Mode::Create, depth + 1, user)?;
                Ok(Some(op("create", Value::Object(nested))))
            }
            Value::String(_) | Value::Number(_) => {
                Ok(Some(op("connect", Value::Object(scalar_reference(value, target)?))))
            }
            other => Err(ValidationError::invalid_payload(
                &model.name,
                format!("'{}' expects an object or a key, got {}", field.name, other),
            )),
        }
    }
}

fn as_object<'v>(model: &str, data: &'v Value) -> Result<&'v Map<String, Value>, ValidationError> {
    data.as_object()
        .ok_or_else(|| ValidationError::invalid_payload(model, "payload must be a JSON object"))
}

fn op(name: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(name.to_string(), value);
    Value::Object(map)
}

fn is_relation_op(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| !obj.is_empty() && obj.keys().all(|k| RELATION_OPS.contains(&k.as_str())))
}

/// Whether `obj` holds exactly the primary key columns.
fn is_key_only(obj: &Map<String, Value>, pk: &PrimaryKey) -> bool {
    let fields = pk.fields();
    obj.len() == fields.len() && fields.iter().all(|f| obj.get(*f).is_some_and(|v| !v.is_null()))
}

fn unique_reference(obj: &Map<String, Value>, target: &ModelDescriptor) -> Result<Map<String, Value>, ValidationError> {
    let key = match &target.primary_key {
        PrimaryKey::Single(field) => RecordKey::Single(obj.get(field).cloned().unwrap_or(Value::Null)),
        PrimaryKey::Composite(_) => RecordKey::Composite(obj.clone()),
    };
    key.unique_where(&target.primary_key, &target.name)
}

fn scalar_reference(value: &Value, target: &ModelDescriptor) -> Result<Map<String, Value>, ValidationError> {
    RecordKey::Single(value.clone()).unique_where(&target.primary_key, &target.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use warden_core::ValidationErrorKind;
    use warden_policy::FnPolicy;

    struct Setup {
        resolver: RelationshipResolver,
        policies: PolicyRegistry,
        config: MutationConfig,
    }

    impl Setup {
        fn new() -> Self {
            let mut policies = PolicyRegistry::new();
            policies.register("Post", FnPolicy::new().with_omitted(["score"]));
            Self {
                resolver: RelationshipResolver::new(fixtures::catalog()),
                policies,
                config: MutationConfig::default(),
            }
        }

        fn transformer(&self) -> MutationTransformer<'_> {
            MutationTransformer::new(&self.resolver, &self.policies, &self.config)
        }
    }

    fn member() -> Principal {
        Principal::new("u1", "member")
    }

    #[test]
    fn test_foreign_key_becomes_connect() {
        let setup = Setup::new();
        let out = setup
            .transformer()
            .create("User", &json!({"companyId": "c1"}), &member())
            .unwrap();
        assert_eq!(Value::Object(out), json!({"company": {"connect": {"id": "c1"}}}));
    }

    #[test]
    fn test_null_foreign_key() {
        let setup = Setup::new();
        let t = setup.transformer();
        let key = RecordKey::from("u1");

        let out = t.update("User", &key, &json!({"companyId": null}), &member()).unwrap();
        assert_eq!(Value::Object(out), json!({"company": {"disconnect": true}}));

        let out = t.create("User", &json!({"email": "a@b", "companyId": null}), &member()).unwrap();
        assert_eq!(Value::Object(out), json!({"email": "a@b"}));
    }

    #[test]
    fn test_composite_foreign_key() {
        let setup = Setup::new();
        let out = setup
            .transformer()
            .create("Invite", &json!({"id": 1, "orgId": "o1", "userId": "u1"}), &Principal::system())
            .unwrap();
        assert_eq!(
            Value::Object(out),
            json!({
                "id": 1,
                "membership": {"connect": {"orgId_userId": {"orgId": "o1", "userId": "u1"}}}
            })
        );

        let out = setup
            .transformer()
            .create("Invite", &json!({"orgId": "o1"}), &Principal::system())
            .unwrap();
        assert_eq!(Value::Object(out), json!({"orgId": "o1"}));
    }

    #[test]
    fn test_singular_relation_shapes() {
        let setup = Setup::new();
        let t = setup.transformer();
        let user = Principal::system();

        let out = t.create("Post", &json!({"title": "t", "author": {"id": "u1"}}), &user).unwrap();
        assert_eq!(out["author"], json!({"connect": {"id": "u1"}}));

        let out = t
            .create("Post", &json!({"title": "t", "author": {"email": "x@y", "companyId": "c1"}}), &user)
            .unwrap();
        assert_eq!(
            out["author"],
            json!({"create": {"email": "x@y", "company": {"connect": {"id": "c1"}}}})
        );

        let out = t.create("Post", &json!({"author": "u2"}), &user).unwrap();
        assert_eq!(out["author"], json!({"connect": {"id": "u2"}}));
    }

    #[test]
    fn test_list_relation_partition() {
        let setup = Setup::new();
        let out = setup
            .transformer()
            .create(
                "Post",
                &json!({"tags": [{"id": "t1"}, {"label": "new"}, "t2"]}),
                &Principal::system(),
            )
            .unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"tags": {
                "connect": [{"id": "t1"}, {"id": "t2"}],
                "create": [{"label": "new"}]
            }})
        );
    }

    #[test]
    fn test_empty_list_relation() {
        let setup = Setup::new();
        let t = setup.transformer();
        let out = t.create("Post", &json!({"title": "t", "tags": []}), &member()).unwrap();
        assert_eq!(Value::Object(out), json!({"title": "t"}));

        let out = t.update("Post", &RecordKey::from("p1"), &json!({"tags": []}), &member()).unwrap();
        assert_eq!(Value::Object(out), json!({"tags": {"set": []}}));
    }

    #[test]
    fn test_relation_ops_pass_through() {
        let setup = Setup::new();
        let payload = json!({"tags": {"set": [{"id": "t1"}]}, "author": {"disconnect": true}});
        let out = setup
            .transformer()
            .update("Post", &RecordKey::from("p1"), &payload, &member())
            .unwrap();
        assert_eq!(Value::Object(out), payload);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let setup = Setup::new();
        let err = setup
            .transformer()
            .create("Post", &json!({"title": "t", "colour": "red"}), &member())
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnknownField);
        assert_eq!(err.data["field"], "colour");
    }

    #[test]
    fn test_create_strips_omitted_fields_at_every_level() {
        let setup = Setup::new();
        let out = setup
            .transformer()
            .create(
                "User",
                &json!({"email": "a@b", "posts": [{"title": "t", "score": 3.5}]}),
                &member(),
            )
            .unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"email": "a@b", "posts": {"create": [{"title": "t"}]}})
        );
    }

    #[test]
    fn test_update_strips_system_managed_fields_only() {
        let setup = Setup::new();
        let out = setup
            .transformer()
            .update(
                "Post",
                &RecordKey::from("p1"),
                &json!({"title": "t", "score": 1, "createdAt": "2020-01-01", "createdBy": "x"}),
                &member(),
            )
            .unwrap();
        assert_eq!(Value::Object(out), json!({"title": "t", "score": 1}));
    }

    #[test]
    fn test_payload_is_not_mutated() {
        let setup = Setup::new();
        let payload = json!({
            "title": "t",
            "authorId": "u1",
            "createdBy": "x",
            "tags": [{"id": "t1"}, {"label": "l"}]
        });
        let snapshot = payload.clone();
        let t = setup.transformer();
        t.create("Post", &payload, &member()).unwrap();
        t.update("Post", &RecordKey::from("p1"), &payload, &member()).unwrap();
        assert_eq!(payload, snapshot);
    }

    #[test]
    fn test_nesting_limit() {
        let mut setup = Setup::new();
        setup.config.max_depth = 1;
        let payload = json!({"author": {"email": "e", "company": {"name": "c", "users": [{"email": "x"}]}}});
        let err = setup
            .transformer()
            .create("Post", &payload, &Principal::system())
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::NestingTooDeep);
    }

    #[test]
    fn test_update_validates_key() {
        let setup = Setup::new();
        let key = RecordKey::from("o1");
        let err = setup
            .transformer()
            .update("Membership", &key, &json!({"role": "x"}), &member())
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::InvalidKey);
    }
}
