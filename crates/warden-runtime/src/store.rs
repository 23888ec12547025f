//! The persistence seam.
//!
//! The engine never talks to a database directly. Every translated request
//! is handed to a [`Store`] together with the caller's [`RlsContext`].

use crate::rls::RlsContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use warden_core::StoreError;

/// Store operation a request is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreOperation {
    FindMany,
    FindUnique,
    Count,
    Create,
    Update,
    Delete,
    Upsert,
    CreateMany,
}

impl StoreOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::FindMany => "findMany",
            StoreOperation::FindUnique => "findUnique",
            StoreOperation::Count => "count",
            StoreOperation::Create => "create",
            StoreOperation::Update => "update",
            StoreOperation::Delete => "delete",
            StoreOperation::Upsert => "upsert",
            StoreOperation::CreateMany => "createMany",
        }
    }

    /// Whether the operation writes.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            StoreOperation::FindMany | StoreOperation::FindUnique | StoreOperation::Count
        )
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One translated request: the model, the operation and its arguments
/// (`where`, `select`/`include`/`omit`, `data`, `orderBy`, `take`, `skip`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRequest {
    pub model: String,
    pub operation: StoreOperation,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl StoreRequest {
    pub fn new(model: impl Into<String>, operation: StoreOperation) -> Self {
        Self {
            model: model.into(),
            operation,
            args: Map::new(),
        }
    }

    /// Set an argument. `null` and empty objects are not written.
    pub fn with_arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let empty = match &value {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if !empty {
            self.args.insert(key.to_string(), value);
        }
        self
    }

    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }

    pub fn to_value(&self) -> Value {
        json!({
            "model": self.model,
            "operation": self.operation,
            "args": self.args,
        })
    }
}

/// Executes translated requests.
///
/// Implementations apply `rls` however their backend supports it, e.g. as
/// session variables set at the start of each transaction.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_many(&self, request: StoreRequest, rls: &RlsContext) -> Result<Vec<Value>, StoreError>;

    /// `None` when no record matches.
    async fn find_unique(&self, request: StoreRequest, rls: &RlsContext) -> Result<Option<Value>, StoreError>;

    async fn count(&self, request: StoreRequest, rls: &RlsContext) -> Result<u64, StoreError>;

    async fn create(&self, request: StoreRequest, rls: &RlsContext) -> Result<Value, StoreError>;

    async fn update(&self, request: StoreRequest, rls: &RlsContext) -> Result<Value, StoreError>;

    async fn delete(&self, request: StoreRequest, rls: &RlsContext) -> Result<Value, StoreError>;

    async fn upsert(&self, request: StoreRequest, rls: &RlsContext) -> Result<Value, StoreError>;

    /// Insert `args.data` (an array of flat rows). Returns the inserted count.
    async fn create_many(&self, request: StoreRequest, rls: &RlsContext) -> Result<u64, StoreError>;

    /// Run `requests` atomically under one RLS context. Results are in
    /// request order.
    async fn transaction(&self, requests: Vec<StoreRequest>, rls: &RlsContext) -> Result<Vec<Value>, StoreError>;

    /// Dispatch a request on its operation. Results are normalized to JSON:
    /// a missing unique record is `null`, counts are `{count: n}`.
    async fn execute(&self, request: StoreRequest, rls: &RlsContext) -> Result<Value, StoreError> {
        match request.operation {
            StoreOperation::FindMany => Ok(Value::Array(self.find_many(request, rls).await?)),
            StoreOperation::FindUnique => Ok(self.find_unique(request, rls).await?.unwrap_or(Value::Null)),
            StoreOperation::Count => Ok(json!({ "count": self.count(request, rls).await? })),
            StoreOperation::Create => self.create(request, rls).await,
            StoreOperation::Update => self.update(request, rls).await,
            StoreOperation::Delete => self.delete(request, rls).await,
            StoreOperation::Upsert => self.upsert(request, rls).await,
            StoreOperation::CreateMany => Ok(json!({ "count": self.create_many(request, rls).await? })),
        }
    }
}
