#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use warden_core::{Catalog, EngineConfig, StoreError};
use warden_policy::PolicyRegistry;
use warden_runtime::{Engine, RlsContext, Store, StoreOperation, StoreRequest};

pub const SCHEMA: &str = r#"
models:
  - name: Company
    fields:
      - { name: id, id: true }
      - { name: name, required: true }
      - { name: users, list: true, relation: { model: User } }
  - name: User
    fields:
      - { name: id, id: true }
      - { name: email, required: true, unique: true }
      - { name: name }
      - { name: password }
      - { name: companyId }
      - { name: company, relation: { model: Company, fields: [companyId], references: [id] } }
      - { name: posts, list: true, relation: { model: Post } }
  - name: Post
    fields:
      - { name: id, id: true }
      - { name: title, required: true }
      - { name: published, type: Boolean, required: true }
      - { name: authorId }
      - { name: author, relation: { model: User, fields: [authorId], references: [id] } }
      - { name: tags, list: true, relation: { model: Tag } }
      - { name: createdAt, type: DateTime }
      - { name: createdBy }
      - { name: updatedAt, type: DateTime }
      - { name: deletedAt, type: DateTime }
  - name: Tag
    fields:
      - { name: id, id: true }
      - { name: label, required: true }
      - { name: posts, list: true, relation: { model: Post } }
  - name: Invoice
    fields:
      - { name: id, type: Int, id: true }
      - { name: ownerId, required: true }
      - { name: total, type: Float }
"#;

type Reply = Result<Value, StoreError>;

/// In-memory store answering from per-operation queues and recording
/// every request it sees.
#[derive(Default)]
pub struct MockStore {
    requests: Mutex<Vec<StoreRequest>>,
    contexts: Mutex<Vec<RlsContext>>,
    replies: Mutex<HashMap<StoreOperation, VecDeque<Reply>>>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the next answer for `operation`.
    pub fn reply(&self, operation: StoreOperation, value: Value) {
        self.push(operation, Ok(value));
    }

    /// Queue a failure for `operation`.
    pub fn fail(&self, operation: StoreOperation, err: StoreError) {
        self.push(operation, Err(err));
    }

    fn push(&self, operation: StoreOperation, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<StoreRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<StoreOperation> {
        self.requests().iter().map(|r| r.operation).collect()
    }

    pub fn last(&self, operation: StoreOperation) -> StoreRequest {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.operation == operation)
            .unwrap_or_else(|| panic!("no {} request recorded", operation))
    }

    pub fn contexts(&self) -> Vec<RlsContext> {
        self.contexts.lock().unwrap().clone()
    }

    fn next(&self, request: &StoreRequest, rls: &RlsContext) -> Option<Reply> {
        self.requests.lock().unwrap().push(request.clone());
        self.contexts.lock().unwrap().push(rls.clone());
        self.replies
            .lock()
            .unwrap()
            .get_mut(&request.operation)
            .and_then(VecDeque::pop_front)
    }
}

fn data_of(request: &StoreRequest, key: &str) -> Value {
    request.arg(key).cloned().unwrap_or(Value::Null)
}

#[async_trait]
impl Store for MockStore {
    async fn find_many(&self, request: StoreRequest, rls: &RlsContext) -> Result<Vec<Value>, StoreError> {
        match self.next(&request, rls) {
            Some(reply) => Ok(reply?.as_array().cloned().unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    async fn find_unique(&self, request: StoreRequest, rls: &RlsContext) -> Result<Option<Value>, StoreError> {
        match self.next(&request, rls) {
            Some(reply) => Ok(Some(reply?).filter(|v| !v.is_null())),
            None => Ok(None),
        }
    }

    async fn count(&self, request: StoreRequest, rls: &RlsContext) -> Result<u64, StoreError> {
        match self.next(&request, rls) {
            Some(reply) => Ok(reply?.as_u64().unwrap_or(0)),
            None => Ok(0),
        }
    }

    async fn create(&self, request: StoreRequest, rls: &RlsContext) -> Result<Value, StoreError> {
        match self.next(&request, rls) {
            Some(reply) => reply,
            None => Ok(data_of(&request, "data")),
        }
    }

    async fn update(&self, request: StoreRequest, rls: &RlsContext) -> Result<Value, StoreError> {
        match self.next(&request, rls) {
            Some(reply) => reply,
            None => Ok(data_of(&request, "data")),
        }
    }

    async fn delete(&self, request: StoreRequest, rls: &RlsContext) -> Result<Value, StoreError> {
        match self.next(&request, rls) {
            Some(reply) => reply,
            None => Ok(data_of(&request, "where")),
        }
    }

    async fn upsert(&self, request: StoreRequest, rls: &RlsContext) -> Result<Value, StoreError> {
        match self.next(&request, rls) {
            Some(reply) => reply,
            None => Ok(data_of(&request, "create")),
        }
    }

    async fn create_many(&self, request: StoreRequest, rls: &RlsContext) -> Result<u64, StoreError> {
        match self.next(&request, rls) {
            Some(reply) => Ok(reply?.as_u64().unwrap_or(0)),
            None => Ok(request.arg("data").and_then(Value::as_array).map_or(0, Vec::len) as u64),
        }
    }

    async fn transaction(&self, requests: Vec<StoreRequest>, rls: &RlsContext) -> Result<Vec<Value>, StoreError> {
        let mut results = Vec::new();
        for request in requests {
            results.push(self.execute(request, rls).await?);
        }
        Ok(results)
    }
}

pub fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::from_yaml(SCHEMA).unwrap())
}

pub fn engine(store: Arc<MockStore>, policies: PolicyRegistry) -> Engine {
    engine_with(store, policies, EngineConfig::default())
}

pub fn engine_with(store: Arc<MockStore>, policies: PolicyRegistry, config: EngineConfig) -> Engine {
    Engine::builder(catalog(), store).policies(policies).config(config).build()
}
