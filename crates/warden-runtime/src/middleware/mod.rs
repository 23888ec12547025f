//! Before/after hooks around facade operations.
//!
//! Handlers are registered per `(hook, operation, model)`; the model `"*"`
//! matches every model. A chain runs global handlers first, then the
//! model's own, each in registration order. Every handler receives the
//! context returned by the previous one and answers with [`Flow`]:
//! `Abort` skips the rest of the chain.

pub mod builtin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use warden_core::{EngineError, Predicate, Principal, RecordKey};

/// Model name matching every model.
pub const ANY_MODEL: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hook {
    Before,
    After,
}

/// Facade operation a chain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    GetMany,
    Get,
    Count,
    Create,
    Update,
    Delete,
    Upsert,
    UpsertMany,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::GetMany,
        Operation::Get,
        Operation::Count,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
        Operation::Upsert,
        Operation::UpsertMany,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetMany => "getMany",
            Operation::Get => "get",
            Operation::Count => "count",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Upsert => "upsert",
            Operation::UpsertMany => "upsertMany",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::GetMany | Operation::Get | Operation::Count)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// REST-style read parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryParams {
    /// Filter expression (`age=gt:18,name=*ann*`).
    #[serde(alias = "q")]
    pub filter: Option<String>,
    pub fields: Option<String>,
    pub include: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl QueryParams {
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    pub fn include(mut self, include: impl Into<String>) -> Self {
        self.include = Some(include.into());
        self
    }

    pub fn page(mut self, limit: u64, offset: u64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    pub fn sort(mut self, sort_by: impl Into<String>, sort_order: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self.sort_order = Some(sort_order.into());
        self
    }
}

/// Everything a facade call was given. Middleware may rewrite any of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationParams {
    #[serde(flatten)]
    pub query: QueryParams,
    pub id: Option<RecordKey>,
    /// Mutation payload; an array for `upsertMany`.
    pub data: Option<Value>,
    /// Extra where clause AND-ed into reads.
    #[serde(rename = "where")]
    pub where_: Option<Predicate>,
}

impl OperationParams {
    /// AND `predicate` into the extra where clause.
    pub fn add_where(&mut self, predicate: Predicate) {
        let current = self.where_.take().unwrap_or_default();
        let combined = Predicate::and([current, predicate]);
        self.where_ = (!combined.is_empty()).then_some(combined);
    }
}

/// Request-local state threaded through a middleware chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiddlewareContext {
    pub model: String,
    pub operation: Operation,
    pub user: Principal,
    pub params: OperationParams,
    /// Set by the facade after the store call, or by a `before` handler to
    /// answer without touching the store.
    pub result: Option<Value>,
    /// Turn a delete into an update with `params.data`.
    pub soft_delete: bool,
}

impl MiddlewareContext {
    pub fn new(model: impl Into<String>, operation: Operation, user: Principal) -> Self {
        Self {
            model: model.into(),
            operation,
            user,
            params: OperationParams::default(),
            result: None,
            soft_delete: false,
        }
    }

    pub fn with_params(mut self, params: OperationParams) -> Self {
        self.params = params;
        self
    }
}

/// Outcome of one handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Continue(MiddlewareContext),
    /// Skip the remaining handlers of this chain.
    Abort(MiddlewareContext),
}

impl Flow {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Flow::Abort(_))
    }

    pub fn context(&self) -> &MiddlewareContext {
        match self {
            Flow::Continue(ctx) | Flow::Abort(ctx) => ctx,
        }
    }

    pub fn into_context(self) -> MiddlewareContext {
        match self {
            Flow::Continue(ctx) | Flow::Abort(ctx) => ctx,
        }
    }
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: MiddlewareContext) -> Result<Flow, EngineError>;
}

/// Middleware backed by an async closure.
pub struct FnMiddleware<F> {
    f: F,
}

/// Wrap an async closure as a [`Middleware`].
pub fn from_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(MiddlewareContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Flow, EngineError>> + Send + 'static,
{
    FnMiddleware { f }
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(MiddlewareContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Flow, EngineError>> + Send + 'static,
{
    async fn handle(&self, ctx: MiddlewareContext) -> Result<Flow, EngineError> {
        (self.f)(ctx).await
    }
}

struct Registration {
    model: String,
    handler: Arc<dyn Middleware>,
}

/// Registry and executor of middleware chains.
#[derive(Default)]
pub struct MiddlewarePipeline {
    chains: RwLock<HashMap<(Hook, Operation), Vec<Registration>>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the `(hook, operation)` chain for `model`
    /// ([`ANY_MODEL`] for all models).
    pub fn register(&self, hook: Hook, operation: Operation, model: &str, handler: impl Middleware + 'static) {
        self.register_arc(hook, operation, model, Arc::new(handler));
    }

    pub fn register_arc(&self, hook: Hook, operation: Operation, model: &str, handler: Arc<dyn Middleware>) {
        let mut chains = self.chains.write().unwrap_or_else(PoisonError::into_inner);
        chains.entry((hook, operation)).or_default().push(Registration {
            model: model.to_string(),
            handler,
        });
        tracing::debug!(hook = ?hook, operation = %operation, model = model, "Middleware registered");
    }

    pub fn before(&self, operation: Operation, model: &str, handler: impl Middleware + 'static) {
        self.register(Hook::Before, operation, model, handler);
    }

    pub fn after(&self, operation: Operation, model: &str, handler: impl Middleware + 'static) {
        self.register(Hook::After, operation, model, handler);
    }

    /// Number of handlers that would run for `model`.
    pub fn chain_len(&self, hook: Hook, operation: Operation, model: &str) -> usize {
        self.chain(hook, operation, model).len()
    }

    fn chain(&self, hook: Hook, operation: Operation, model: &str) -> Vec<Arc<dyn Middleware>> {
        let chains = self.chains.read().unwrap_or_else(PoisonError::into_inner);
        let Some(registered) = chains.get(&(hook, operation)) else {
            return Vec::new();
        };
        let global = registered.iter().filter(|r| r.model == ANY_MODEL);
        let specific = registered.iter().filter(|r| r.model != ANY_MODEL && r.model == model);
        global.chain(specific).map(|r| Arc::clone(&r.handler)).collect()
    }

    /// Run the chain for `ctx.model`. The registry lock is released before
    /// the first handler runs.
    pub async fn execute(&self, hook: Hook, operation: Operation, ctx: MiddlewareContext) -> Result<Flow, EngineError> {
        let chain = self.chain(hook, operation, &ctx.model);
        let mut ctx = ctx;
        for (index, handler) in chain.iter().enumerate() {
            match handler.handle(ctx).await? {
                Flow::Continue(next) => ctx = next,
                Flow::Abort(next) => {
                    tracing::debug!(
                        hook = ?hook,
                        operation = %operation,
                        model = %next.model,
                        skipped = chain.len() - index - 1,
                        "Middleware chain aborted"
                    );
                    return Ok(Flow::Abort(next));
                }
            }
        }
        Ok(Flow::Continue(ctx))
    }
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chains = self.chains.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<String, usize> = chains
            .iter()
            .map(|((hook, op), regs)| (format!("{:?}:{}", hook, op), regs.len()))
            .collect();
        f.debug_struct("MiddlewarePipeline").field("chains", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tagger(tag: &'static str) -> impl Middleware {
        from_fn(move |mut ctx: MiddlewareContext| async move {
            let mut seen = ctx.result.take().unwrap_or_else(|| json!([]));
            if let Some(items) = seen.as_array_mut() {
                items.push(json!(tag));
            }
            ctx.result = Some(seen);
            Ok::<_, EngineError>(Flow::Continue(ctx))
        })
    }

    fn ctx(model: &str) -> MiddlewareContext {
        MiddlewareContext::new(model, Operation::Create, Principal::system())
    }

    #[tokio::test]
    async fn test_global_handlers_run_first_in_registration_order() {
        let pipeline = MiddlewarePipeline::new();
        pipeline.before(Operation::Create, "Post", tagger("post-1"));
        pipeline.before(Operation::Create, ANY_MODEL, tagger("global-1"));
        pipeline.before(Operation::Create, "Post", tagger("post-2"));
        pipeline.before(Operation::Create, ANY_MODEL, tagger("global-2"));
        pipeline.before(Operation::Create, "User", tagger("user"));

        let flow = pipeline.execute(Hook::Before, Operation::Create, ctx("Post")).await.unwrap();
        assert!(!flow.is_aborted());
        assert_eq!(
            flow.into_context().result,
            Some(json!(["global-1", "global-2", "post-1", "post-2"]))
        );
    }

    #[tokio::test]
    async fn test_abort_skips_remaining_handlers() {
        let pipeline = MiddlewarePipeline::new();
        pipeline.before(Operation::Create, ANY_MODEL, tagger("first"));
        pipeline.before(
            Operation::Create,
            ANY_MODEL,
            from_fn(|ctx: MiddlewareContext| async move { Ok::<_, EngineError>(Flow::Abort(ctx)) }),
        );
        pipeline.before(Operation::Create, ANY_MODEL, tagger("never"));

        let flow = pipeline.execute(Hook::Before, Operation::Create, ctx("Post")).await.unwrap();
        assert!(flow.is_aborted());
        assert_eq!(flow.context().result, Some(json!(["first"])));
    }

    #[tokio::test]
    async fn test_hooks_and_operations_are_separate_chains() {
        let pipeline = MiddlewarePipeline::new();
        pipeline.after(Operation::Create, ANY_MODEL, tagger("after"));
        pipeline.before(Operation::Update, ANY_MODEL, tagger("update"));

        let flow = pipeline.execute(Hook::Before, Operation::Create, ctx("Post")).await.unwrap();
        assert_eq!(flow.into_context().result, None);
        assert_eq!(pipeline.chain_len(Hook::After, Operation::Create, "Tag"), 1);
    }

    #[tokio::test]
    async fn test_handler_error_stops_chain() {
        let pipeline = MiddlewarePipeline::new();
        pipeline.before(
            Operation::Create,
            ANY_MODEL,
            from_fn(|ctx: MiddlewareContext| async move {
                Err::<Flow, _>(EngineError::from(warden_core::PermissionError::create_denied(&ctx.model)))
            }),
        );
        let err = pipeline.execute(Hook::Before, Operation::Create, ctx("Post")).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn test_add_where_combines_predicates() {
        let mut params = OperationParams::default();
        params.add_where(Predicate::from_value(json!({"deletedAt": null})));
        assert_eq!(params.where_.clone().unwrap().into_value(), json!({"deletedAt": null}));
        params.add_where(Predicate::from_value(json!({"published": true})));
        assert_eq!(
            params.where_.unwrap().into_value(),
            json!({"AND": [{"deletedAt": null}, {"published": true}]})
        );
    }
}
