//! Per-model CRUD entry point.
//!
//! Every call follows the same lifecycle: build a [`MiddlewareContext`],
//! run the `before` chain, enforce the model's access policy, translate the
//! request, call the store, run the `after` chain. A `before` handler that
//! aborts with a result answers the call without touching the store.

use crate::engine::EngineInner;
use crate::middleware::{Flow, Hook, MiddlewareContext, Operation, OperationParams, QueryParams};
use crate::rls::RlsContext;
use crate::store::{StoreOperation, StoreRequest};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::{
    EngineError, ModelDescriptor, PermissionError, Predicate, PrimaryKey, Principal, RecordKey,
    ValidationError,
};
use warden_policy::{ModelPolicy, PolicyFilter};
use warden_query::{FilterParser, MutationTransformer, Page, SelectionBuilder, SortOrder, order_by};

/// One record that `upsert_many` could not write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertFailure {
    pub index: usize,
    pub error: String,
}

/// Outcome of `upsert_many`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSummary {
    pub created: u64,
    pub updated: u64,
    pub failed: Vec<UpsertFailure>,
    pub total_success: u64,
    pub total_failed: u64,
}

impl UpsertSummary {
    fn fail(&mut self, index: usize, err: &EngineError) {
        self.failed.push(UpsertFailure {
            index,
            error: err.to_string(),
        });
    }

    fn finish(mut self) -> Self {
        self.failed.sort_by_key(|f| f.index);
        self.total_success = self.created + self.updated;
        self.total_failed = self.failed.len() as u64;
        self
    }

    pub fn to_value(&self) -> Value {
        json!({
            "created": self.created,
            "updated": self.updated,
            "failed": self.failed,
            "totalSuccess": self.total_success,
            "totalFailed": self.total_failed,
        })
    }
}

/// CRUD operations on one model, on behalf of one principal.
pub struct ModelFacade {
    engine: Arc<EngineInner>,
    model: String,
    user: Principal,
}

impl ModelFacade {
    pub(crate) fn new(engine: Arc<EngineInner>, model: String, user: Principal) -> Self {
        Self { engine, model, user }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn user(&self) -> &Principal {
        &self.user
    }

    /// List records. Returns `{data, meta: {take, skip, total}}`.
    pub async fn get_many(&self, query: QueryParams) -> Result<Value, EngineError> {
        let params = OperationParams {
            query,
            ..OperationParams::default()
        };
        self.run(Operation::GetMany, params).await
    }

    /// Fetch one record by key. `extra_where` is AND-ed into the lookup.
    pub async fn get(
        &self,
        id: impl Into<RecordKey>,
        query: QueryParams,
        extra_where: Option<Predicate>,
    ) -> Result<Value, EngineError> {
        let params = OperationParams {
            query,
            id: Some(id.into()),
            where_: extra_where,
            ..OperationParams::default()
        };
        self.run(Operation::Get, params).await
    }

    /// Count records matching `filter`. Returns `{count}`.
    pub async fn count(&self, filter: Option<&str>) -> Result<Value, EngineError> {
        let params = OperationParams {
            query: QueryParams {
                filter: filter.map(str::to_string),
                ..QueryParams::default()
            },
            ..OperationParams::default()
        };
        self.run(Operation::Count, params).await
    }

    pub async fn create(&self, data: &Value) -> Result<Value, EngineError> {
        let params = OperationParams {
            data: Some(data.clone()),
            ..OperationParams::default()
        };
        self.run(Operation::Create, params).await
    }

    pub async fn update(&self, id: impl Into<RecordKey>, data: &Value) -> Result<Value, EngineError> {
        let params = OperationParams {
            id: Some(id.into()),
            data: Some(data.clone()),
            ..OperationParams::default()
        };
        self.run(Operation::Update, params).await
    }

    pub async fn delete(&self, id: impl Into<RecordKey>) -> Result<Value, EngineError> {
        let params = OperationParams {
            id: Some(id.into()),
            ..OperationParams::default()
        };
        self.run(Operation::Delete, params).await
    }

    /// Create or update one record, keyed by the primary key fields in
    /// `data`. A payload without a full key is a plain create.
    pub async fn upsert(&self, data: &Value) -> Result<Value, EngineError> {
        let params = OperationParams {
            data: Some(data.clone()),
            ..OperationParams::default()
        };
        self.run(Operation::Upsert, params).await
    }

    /// Create or update many records. Per-record failures are collected in
    /// the summary instead of failing the call.
    pub async fn upsert_many(&self, records: &[Value]) -> Result<Value, EngineError> {
        if records.is_empty() {
            return Ok(UpsertSummary::default().to_value());
        }
        let params = OperationParams {
            data: Some(Value::Array(records.to_vec())),
            ..OperationParams::default()
        };
        self.run(Operation::UpsertMany, params).await
    }

    async fn run(&self, operation: Operation, params: OperationParams) -> Result<Value, EngineError> {
        let pipeline = &self.engine.pipeline;
        let ctx = MiddlewareContext::new(&self.model, operation, self.user.clone()).with_params(params);

        let ctx = match pipeline.execute(Hook::Before, operation, ctx).await? {
            Flow::Abort(MiddlewareContext {
                result: Some(result), ..
            }) => {
                debug!(model = %self.model, operation = %operation, "Answered by middleware");
                return Ok(result);
            }
            flow => flow.into_context(),
        };

        let result = match operation {
            Operation::GetMany => self.find_many(&ctx).await?,
            Operation::Get => self.find_one(&ctx).await?,
            Operation::Count => self.count_records(&ctx).await?,
            Operation::Create => self.create_record(&ctx).await?,
            Operation::Update => self.update_record(&ctx).await?,
            Operation::Delete => self.delete_record(&ctx).await?,
            Operation::Upsert => self.upsert_record(&ctx).await?,
            Operation::UpsertMany => self.upsert_records(&ctx).await?,
        };

        let mut ctx = ctx;
        ctx.result = Some(result);
        let ctx = pipeline.execute(Hook::After, operation, ctx).await?.into_context();
        Ok(ctx.result.unwrap_or(Value::Null))
    }

    // =========================================================================
    // READS
    // =========================================================================

    async fn find_many(&self, ctx: &MiddlewareContext) -> Result<Value, EngineError> {
        let query = &ctx.params.query;
        let filter = self.read_filter(ctx)?;
        let projection = self.selection().build(
            &self.model,
            query.fields.as_deref(),
            query.include.as_deref(),
            &ctx.user,
        )?;
        let page = Page::new(&self.engine.config.pagination, query.limit, query.offset);
        let order = match query.sort_by.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(sort_by) => {
                let direction = SortOrder::parse(query.sort_order.as_deref())?;
                Some(order_by(&self.engine.resolver, &self.model, sort_by, direction)?)
            }
            None => None,
        };

        let filter = filter.into_value();
        let mut find = self
            .request(StoreOperation::FindMany)
            .with_arg("where", filter.clone())
            .with_arg("orderBy", order)
            .with_arg("take", page.take)
            .with_arg("skip", page.skip);
        projection.apply(&mut find.args);
        let count = self.request(StoreOperation::Count).with_arg("where", filter);
        debug!(model = %self.model, operation = "getMany", request = %find.to_value(), "Translated request");

        let rls = RlsContext::for_principal(&ctx.user);
        let store = &self.engine.store;
        let (data, total) = futures::try_join!(store.find_many(find, &rls), store.count(count, &rls))?;
        Ok(json!({
            "data": data,
            "meta": { "take": page.take, "skip": page.skip, "total": total },
        }))
    }

    async fn find_one(&self, ctx: &MiddlewareContext) -> Result<Value, EngineError> {
        let key = self.require_id(ctx)?;
        let unique = self.unique_where(&key)?;
        let access = self.access_filter(&ctx.user)?;
        let query = &ctx.params.query;
        let projection = self.selection().build(
            &self.model,
            query.fields.as_deref(),
            query.include.as_deref(),
            &ctx.user,
        )?;

        let mut filter = unique.clone();
        if let Some(extra) = ctx.params.where_.as_ref().filter(|p| !p.is_empty()) {
            filter.insert("AND".to_string(), json!([extra]));
        }
        let mut request = self.request(StoreOperation::FindUnique).with_arg("where", filter);
        projection.apply(&mut request.args);
        debug!(model = %self.model, operation = "get", request = %request.to_value(), "Translated request");

        let rls = RlsContext::for_principal(&ctx.user);
        let record = self
            .engine
            .store
            .find_unique(request, &rls)
            .await?
            .ok_or_else(|| self.not_found(&key))?;

        if let PolicyFilter::Where(predicate) = access {
            if !self.confirm(&key, &unique, predicate, &rls).await? {
                return Err(self.denied(&ctx.user, PermissionError::record_forbidden(&self.model)));
            }
        }
        Ok(record)
    }

    async fn count_records(&self, ctx: &MiddlewareContext) -> Result<Value, EngineError> {
        let filter = self.read_filter(ctx)?;
        let request = self.request(StoreOperation::Count).with_arg("where", filter.into_value());
        let rls = RlsContext::for_principal(&ctx.user);
        let total = self.engine.store.count(request, &rls).await?;
        Ok(json!({ "count": total }))
    }

    /// Parsed filter AND extra where AND the principal's access predicate.
    fn read_filter(&self, ctx: &MiddlewareContext) -> Result<Predicate, EngineError> {
        let access = self.access_filter(&ctx.user)?;
        let parsed = match ctx.params.query.filter.as_deref() {
            Some(expr) => FilterParser::new(&self.engine.resolver, &self.model).parse(expr)?,
            None => Predicate::new(),
        };
        let extra = ctx.params.where_.clone().unwrap_or_default();
        Ok(Predicate::and([parsed, extra, access.into_predicate()]))
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    async fn create_record(&self, ctx: &MiddlewareContext) -> Result<Value, EngineError> {
        let data = self.require_data(ctx)?;
        let rls = RlsContext::for_principal(&ctx.user);
        self.insert(&ctx.user, data, &rls).await
    }

    async fn insert(&self, user: &Principal, data: &Value, rls: &RlsContext) -> Result<Value, EngineError> {
        if !self.policy().can_create(user, data) {
            return Err(self.denied(user, PermissionError::create_denied(&self.model)));
        }
        let payload = self.transformer().create(&self.model, data, user)?;
        let mut request = self.request(StoreOperation::Create);
        request.args.insert("data".to_string(), Value::Object(payload));
        let request = request.with_arg("omit", self.omit(user));
        debug!(model = %self.model, operation = "create", request = %request.to_value(), "Translated request");

        let record = self.engine.store.create(request, rls).await?;
        info!(model = %self.model, user = %user.id, "Record created");
        Ok(record)
    }

    async fn update_record(&self, ctx: &MiddlewareContext) -> Result<Value, EngineError> {
        let key = self.require_id(ctx)?;
        let data = self.require_data(ctx)?;
        let rls = RlsContext::for_principal(&ctx.user);
        let payload = self.transformer().update(&self.model, &key, data, &ctx.user)?;
        let unique = self.unique_where(&key)?;

        let current = self.load_current(&key, &unique, &rls).await?;
        let filter = self.policy().update_filter(&ctx.user, Some(&current));
        self.enforce(&ctx.user, filter, &key, &unique, &rls, PermissionError::update_denied(&self.model))
            .await?;

        let record = self.write_update(&ctx.user, unique, payload, &rls).await?;
        info!(model = %self.model, user = %ctx.user.id, key = %key, "Record updated");
        Ok(record)
    }

    async fn write_update(
        &self,
        user: &Principal,
        unique: Map<String, Value>,
        payload: Map<String, Value>,
        rls: &RlsContext,
    ) -> Result<Value, EngineError> {
        let mut request = self.request(StoreOperation::Update).with_arg("where", unique);
        request.args.insert("data".to_string(), Value::Object(payload));
        let request = request.with_arg("omit", self.omit(user));
        debug!(model = %self.model, operation = "update", request = %request.to_value(), "Translated request");
        Ok(self.engine.store.update(request, rls).await?)
    }

    async fn delete_record(&self, ctx: &MiddlewareContext) -> Result<Value, EngineError> {
        let key = self.require_id(ctx)?;
        let unique = self.unique_where(&key)?;
        let rls = RlsContext::for_principal(&ctx.user);
        let replacement = if ctx.soft_delete {
            let data = ctx.params.data.clone().unwrap_or_else(|| json!({}));
            Some(self.transformer().update(&self.model, &key, &data, &ctx.user)?)
        } else {
            None
        };

        let current = self.load_current(&key, &unique, &rls).await?;
        let filter = self.policy().delete_filter(&ctx.user, Some(&current));
        self.enforce(&ctx.user, filter, &key, &unique, &rls, PermissionError::delete_denied(&self.model))
            .await?;

        match replacement {
            Some(payload) => {
                let record = self.write_update(&ctx.user, unique, payload, &rls).await?;
                info!(model = %self.model, user = %ctx.user.id, key = %key, "Record soft-deleted");
                Ok(record)
            }
            None => {
                let request = self
                    .request(StoreOperation::Delete)
                    .with_arg("where", unique)
                    .with_arg("omit", self.omit(&ctx.user));
                debug!(model = %self.model, operation = "delete", request = %request.to_value(), "Translated request");
                let record = self.engine.store.delete(request, &rls).await?;
                info!(model = %self.model, user = %ctx.user.id, key = %key, "Record deleted");
                Ok(record)
            }
        }
    }

    async fn upsert_record(&self, ctx: &MiddlewareContext) -> Result<Value, EngineError> {
        let data = self.require_data(ctx)?;
        let rls = RlsContext::for_principal(&ctx.user);
        let pk = &self.descriptor()?.primary_key;
        let Some(key) = RecordKey::from_record(data, pk) else {
            return self.insert(&ctx.user, data, &rls).await;
        };
        let key = key.coerce(self.descriptor()?)?;

        if !self.policy().can_create(&ctx.user, data) {
            return Err(self.denied(&ctx.user, PermissionError::create_denied(&self.model)));
        }
        let transformer = self.transformer();
        let create = transformer.create(&self.model, data, &ctx.user)?;
        let update = transformer.update(&self.model, &key, data, &ctx.user)?;
        let unique = self.unique_where(&key)?;

        let lookup = self.request(StoreOperation::FindUnique).with_arg("where", unique.clone());
        if let Some(current) = self.engine.store.find_unique(lookup, &rls).await? {
            let filter = self.policy().update_filter(&ctx.user, Some(&current));
            self.enforce(&ctx.user, filter, &key, &unique, &rls, PermissionError::update_denied(&self.model))
                .await?;
        }

        let request = self
            .request(StoreOperation::Upsert)
            .with_arg("where", unique)
            .with_arg("create", create)
            .with_arg("update", update)
            .with_arg("omit", self.omit(&ctx.user));
        debug!(model = %self.model, operation = "upsert", request = %request.to_value(), "Translated request");
        let record = self.engine.store.upsert(request, &rls).await?;
        info!(model = %self.model, user = %ctx.user.id, key = %key, "Record upserted");
        Ok(record)
    }

    async fn upsert_records(&self, ctx: &MiddlewareContext) -> Result<Value, EngineError> {
        let rows = match &ctx.params.data {
            Some(Value::Array(rows)) => rows,
            _ => {
                return Err(ValidationError::invalid_payload(&self.model, "expected an array of records").into());
            }
        };
        let mut summary = UpsertSummary::default();
        if rows.is_empty() {
            return Ok(summary.finish().to_value());
        }

        let user = &ctx.user;
        let descriptor = self.descriptor()?;
        let pk = &descriptor.primary_key;
        let rls = RlsContext::for_principal(user);
        let policy = self.policy();
        let transformer = self.transformer();

        let mut keys: Vec<Option<RecordKey>> = Vec::with_capacity(rows.len());
        let mut lookup = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let key = match RecordKey::from_record(row, pk).map(|k| k.coerce(descriptor)).transpose() {
                Ok(key) => key,
                Err(err) => {
                    summary.fail(index, &err.into());
                    keys.push(None);
                    continue;
                }
            };
            if let Some(k) = &key {
                match k.columns(pk, &self.model) {
                    Ok(columns) => lookup.push(columns),
                    Err(err) => {
                        summary.fail(index, &err.into());
                        keys.push(None);
                        continue;
                    }
                }
            }
            keys.push(key);
        }
        let existing = self.lookup_existing(pk, lookup, &rls).await?;

        let mut flat = Vec::new();
        let mut nested = Vec::new();
        let mut updates = Vec::new();
        for (index, (row, key)) in rows.iter().zip(&keys).enumerate() {
            if summary.failed.iter().any(|f| f.index == index) {
                continue;
            }
            let current = key
                .as_ref()
                .and_then(|k| existing.iter().find(|record| k.matches(record, pk)).map(|r| (k, r)));
            if let Some((key, current)) = current {
                updates.push((index, key, row, current));
                continue;
            }
            if !policy.can_create(user, row) {
                summary.fail(index, &self.denied(user, PermissionError::create_denied(&self.model)));
                continue;
            }
            match transformer.create(&self.model, row, user) {
                Ok(payload) if carries_relations(descriptor, &payload) => nested.push((index, payload)),
                Ok(payload) => flat.push((index, payload)),
                Err(err) => summary.fail(index, &err.into()),
            }
        }

        if !flat.is_empty() {
            let data: Vec<Value> = flat.iter().map(|(_, p)| Value::Object(p.clone())).collect();
            let request = self.request(StoreOperation::CreateMany).with_arg("data", data);
            match self.engine.store.create_many(request, &rls).await {
                Ok(count) => summary.created += count,
                Err(err) => {
                    let err = EngineError::from(err);
                    for (index, _) in &flat {
                        summary.fail(*index, &err);
                    }
                }
            }
        }

        for (index, payload) in nested {
            let mut request = self.request(StoreOperation::Create);
            request.args.insert("data".to_string(), Value::Object(payload));
            match self.engine.store.create(request, &rls).await {
                Ok(_) => summary.created += 1,
                Err(err) => summary.fail(index, &err.into()),
            }
        }

        for (index, key, row, current) in updates {
            match self.update_existing(user, key, row, current, &rls).await {
                Ok(_) => summary.updated += 1,
                Err(err) => summary.fail(index, &err),
            }
        }

        let summary = summary.finish();
        info!(
            model = %self.model,
            user = %user.id,
            created = summary.created,
            updated = summary.updated,
            failed = summary.total_failed,
            "Records upserted"
        );
        Ok(summary.to_value())
    }

    /// Fetch the records among `lookup` that already exist, in one request.
    async fn lookup_existing(
        &self,
        pk: &PrimaryKey,
        lookup: Vec<Map<String, Value>>,
        rls: &RlsContext,
    ) -> Result<Vec<Value>, EngineError> {
        if lookup.is_empty() {
            return Ok(Vec::new());
        }
        let filter = match pk {
            PrimaryKey::Single(field) => {
                let values: Vec<Value> = lookup.into_iter().filter_map(|mut c| c.remove(field)).collect();
                let mut map = Map::new();
                map.insert(field.clone(), json!({ "in": values }));
                map
            }
            PrimaryKey::Composite(_) => {
                let mut map = Map::new();
                map.insert(
                    "OR".to_string(),
                    Value::Array(lookup.into_iter().map(Value::Object).collect()),
                );
                map
            }
        };
        let request = self.request(StoreOperation::FindMany).with_arg("where", filter);
        Ok(self.engine.store.find_many(request, rls).await?)
    }

    async fn update_existing(
        &self,
        user: &Principal,
        key: &RecordKey,
        row: &Value,
        current: &Value,
        rls: &RlsContext,
    ) -> Result<Value, EngineError> {
        let payload = self.transformer().update(&self.model, key, row, user)?;
        let unique = self.unique_where(key)?;
        let filter = self.policy().update_filter(user, Some(current));
        self.enforce(user, filter, key, &unique, rls, PermissionError::update_denied(&self.model))
            .await?;
        self.write_update(user, unique, payload, rls).await
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn descriptor(&self) -> Result<&ModelDescriptor, EngineError> {
        Ok(self.engine.resolver.model(&self.model)?)
    }

    fn policy(&self) -> ModelPolicy {
        self.engine.policies.get_policy(&self.model)
    }

    fn selection(&self) -> SelectionBuilder<'_> {
        SelectionBuilder::new(&self.engine.resolver, &self.engine.policies)
            .with_max_depth(self.engine.config.selection.max_depth)
    }

    fn transformer(&self) -> MutationTransformer<'_> {
        MutationTransformer::new(&self.engine.resolver, &self.engine.policies, &self.engine.config.mutation)
    }

    fn request(&self, operation: StoreOperation) -> StoreRequest {
        StoreRequest::new(&self.model, operation)
    }

    fn omit(&self, user: &Principal) -> Map<String, Value> {
        self.selection().omit_map(&self.model, user)
    }

    fn unique_where(&self, key: &RecordKey) -> Result<Map<String, Value>, EngineError> {
        Ok(key.unique_where(&self.descriptor()?.primary_key, &self.model)?)
    }

    fn require_id(&self, ctx: &MiddlewareContext) -> Result<RecordKey, EngineError> {
        let key = ctx
            .params
            .id
            .as_ref()
            .ok_or_else(|| ValidationError::invalid_key(&self.model, "a record key is required"))?;
        Ok(key.coerce(self.descriptor()?)?)
    }

    fn require_data<'c>(&self, ctx: &'c MiddlewareContext) -> Result<&'c Value, EngineError> {
        ctx.params
            .data
            .as_ref()
            .ok_or_else(|| ValidationError::invalid_payload(&self.model, "data is required").into())
    }

    fn access_filter(&self, user: &Principal) -> Result<PolicyFilter, EngineError> {
        let filter = self.policy().access_filter(user);
        if filter.is_denied() {
            return Err(self.denied(user, PermissionError::access_denied(&self.model)));
        }
        Ok(filter)
    }

    fn denied(&self, user: &Principal, err: PermissionError) -> EngineError {
        warn!(model = %self.model, user = %user.id, role = %user.role, reason = %err, "Request denied");
        err.into()
    }

    fn not_found(&self, key: &RecordKey) -> EngineError {
        EngineError::NotFound {
            model: self.model.clone(),
            key: Some(key.to_string()),
        }
    }

    async fn load_current(
        &self,
        key: &RecordKey,
        unique: &Map<String, Value>,
        rls: &RlsContext,
    ) -> Result<Value, EngineError> {
        let request = self.request(StoreOperation::FindUnique).with_arg("where", unique.clone());
        self.engine
            .store
            .find_unique(request, rls)
            .await?
            .ok_or_else(|| self.not_found(key))
    }

    /// Apply an update/delete filter: `Deny` fails with `denied`, `Where`
    /// must match the record.
    async fn enforce(
        &self,
        user: &Principal,
        filter: PolicyFilter,
        key: &RecordKey,
        unique: &Map<String, Value>,
        rls: &RlsContext,
        denied: PermissionError,
    ) -> Result<(), EngineError> {
        match filter {
            PolicyFilter::Unrestricted => Ok(()),
            PolicyFilter::Deny => Err(self.denied(user, denied)),
            PolicyFilter::Where(predicate) => {
                if self.confirm(key, unique, predicate, rls).await? {
                    Ok(())
                } else {
                    Err(self.denied(user, denied))
                }
            }
        }
    }

    /// Key-only fetch of the record under `predicate`. True when the store
    /// returns the same key.
    async fn confirm(
        &self,
        key: &RecordKey,
        unique: &Map<String, Value>,
        predicate: Predicate,
        rls: &RlsContext,
    ) -> Result<bool, EngineError> {
        let pk = &self.descriptor()?.primary_key;
        let mut filter = unique.clone();
        filter.insert("AND".to_string(), json!([predicate]));
        let select: Map<String, Value> = pk
            .fields()
            .into_iter()
            .map(|f| (f.to_string(), Value::Bool(true)))
            .collect();
        let request = self
            .request(StoreOperation::FindUnique)
            .with_arg("where", filter)
            .with_arg("select", select);
        let found = self.engine.store.find_unique(request, rls).await?;
        Ok(found.is_some_and(|record| key.matches(&record, pk)))
    }
}

impl std::fmt::Debug for ModelFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelFacade")
            .field("model", &self.model)
            .field("user", &self.user.id)
            .finish()
    }
}

/// Whether a transformed create payload writes through any relation.
fn carries_relations(descriptor: &ModelDescriptor, payload: &Map<String, Value>) -> bool {
    payload.keys().any(|k| descriptor.relation(k).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_summary_shape() {
        assert_eq!(
            UpsertSummary::default().finish().to_value(),
            json!({"created": 0, "updated": 0, "failed": [], "totalSuccess": 0, "totalFailed": 0})
        );
    }

    #[test]
    fn test_summary_orders_failures_and_totals() {
        let mut summary = UpsertSummary {
            created: 2,
            updated: 1,
            ..UpsertSummary::default()
        };
        summary.fail(3, &ValidationError::unknown_field("Post", "x").into());
        summary.fail(1, &PermissionError::create_denied("Post").into());
        let summary = summary.finish();
        assert_eq!(summary.total_success, 3);
        assert_eq!(summary.total_failed, 2);
        let indexes: Vec<usize> = summary.failed.iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![1, 3]);
    }
}
