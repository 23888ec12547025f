//! A store that records requests instead of executing them.

use crate::rls::RlsContext;
use crate::store::{Store, StoreRequest};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Mutex, PoisonError};
use warden_core::StoreError;

/// Records every request and answers with placeholders derived from it.
///
/// Lookups by key find a record holding the key columns, so reads and
/// writes by key run through the whole facade lifecycle.
#[derive(Debug, Default)]
pub struct DryRunStore {
    requests: Mutex<Vec<StoreRequest>>,
}

impl DryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<StoreRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, request: &StoreRequest) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
    }
}

/// Scalar equality entries of a unique where clause, with compound
/// selectors flattened.
fn key_columns(request: &StoreRequest) -> Map<String, Value> {
    let mut columns = Map::new();
    let Some(Value::Object(filter)) = request.arg("where") else {
        return columns;
    };
    for (name, value) in filter {
        match value {
            Value::Object(compound) if name != "AND" && name != "OR" => {
                for (column, v) in compound {
                    if !v.is_object() {
                        columns.insert(column.clone(), v.clone());
                    }
                }
            }
            Value::Object(_) | Value::Array(_) => {}
            v => {
                columns.insert(name.clone(), v.clone());
            }
        }
    }
    columns
}

fn echo(request: &StoreRequest, data_key: &str) -> Value {
    let mut record = key_columns(request);
    if let Some(Value::Object(data)) = request.arg(data_key) {
        for (k, v) in data {
            if !v.is_object() && !v.is_array() {
                record.insert(k.clone(), v.clone());
            }
        }
    }
    Value::Object(record)
}

#[async_trait]
impl Store for DryRunStore {
    async fn find_many(&self, request: StoreRequest, _rls: &RlsContext) -> Result<Vec<Value>, StoreError> {
        self.record(&request);
        Ok(Vec::new())
    }

    async fn find_unique(&self, request: StoreRequest, _rls: &RlsContext) -> Result<Option<Value>, StoreError> {
        self.record(&request);
        Ok(Some(echo(&request, "data")))
    }

    async fn count(&self, request: StoreRequest, _rls: &RlsContext) -> Result<u64, StoreError> {
        self.record(&request);
        Ok(0)
    }

    async fn create(&self, request: StoreRequest, _rls: &RlsContext) -> Result<Value, StoreError> {
        self.record(&request);
        Ok(echo(&request, "data"))
    }

    async fn update(&self, request: StoreRequest, _rls: &RlsContext) -> Result<Value, StoreError> {
        self.record(&request);
        Ok(echo(&request, "data"))
    }

    async fn delete(&self, request: StoreRequest, _rls: &RlsContext) -> Result<Value, StoreError> {
        self.record(&request);
        Ok(echo(&request, "data"))
    }

    async fn upsert(&self, request: StoreRequest, _rls: &RlsContext) -> Result<Value, StoreError> {
        self.record(&request);
        Ok(echo(&request, "create"))
    }

    async fn create_many(&self, request: StoreRequest, _rls: &RlsContext) -> Result<u64, StoreError> {
        self.record(&request);
        let rows = request.arg("data").and_then(Value::as_array).map_or(0, Vec::len);
        Ok(rows as u64)
    }

    async fn transaction(&self, requests: Vec<StoreRequest>, rls: &RlsContext) -> Result<Vec<Value>, StoreError> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.execute(request, rls).await?);
        }
        Ok(results)
    }
}
