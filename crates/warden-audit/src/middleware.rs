//! Audit hook for the engine's middleware pipeline.

use crate::event::{AuditEvent, AuditEventType};
use crate::logger::AuditLogger;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use warden_core::{EngineError, RecordKey, SchemaCatalog};
use warden_policy::PolicyRegistry;
use warden_runtime::middleware::{ANY_MODEL, Hook};
use warden_runtime::{Flow, Middleware, MiddlewareContext, MiddlewarePipeline, Operation};

const AUDITED: [Operation; 5] = [
    Operation::Create,
    Operation::Update,
    Operation::Delete,
    Operation::Upsert,
    Operation::UpsertMany,
];

/// Register an [`AuditMiddleware`] after every mutating operation of every model.
pub fn install(
    pipeline: &MiddlewarePipeline,
    logger: Arc<AuditLogger>,
    catalog: Arc<dyn SchemaCatalog>,
    policies: PolicyRegistry,
) {
    if !logger.is_enabled() {
        return;
    }
    let hook: Arc<dyn Middleware> = Arc::new(AuditMiddleware::new(logger, catalog, policies));
    for op in AUDITED {
        pipeline.register_arc(Hook::After, op, ANY_MODEL, Arc::clone(&hook));
    }
}

/// Records one event per committed mutation.
///
/// The mutation has already happened when this runs, so storage failures
/// are logged and swallowed. Logged payloads never carry fields the
/// principal's policy omits.
pub struct AuditMiddleware {
    logger: Arc<AuditLogger>,
    catalog: Arc<dyn SchemaCatalog>,
    policies: PolicyRegistry,
}

impl AuditMiddleware {
    pub fn new(logger: Arc<AuditLogger>, catalog: Arc<dyn SchemaCatalog>, policies: PolicyRegistry) -> Self {
        Self {
            logger,
            catalog,
            policies,
        }
    }

    fn event_type(ctx: &MiddlewareContext) -> Option<AuditEventType> {
        match ctx.operation {
            Operation::Create => Some(AuditEventType::RecordCreated),
            Operation::Update => Some(AuditEventType::RecordUpdated),
            Operation::Delete if ctx.soft_delete => Some(AuditEventType::RecordSoftDeleted),
            Operation::Delete => Some(AuditEventType::RecordDeleted),
            Operation::Upsert => Some(AuditEventType::RecordUpserted),
            Operation::UpsertMany => Some(AuditEventType::BatchUpserted),
            _ => None,
        }
    }

    /// The key the caller addressed, or the one read back from the result.
    fn record_key(&self, ctx: &MiddlewareContext) -> Option<String> {
        if let Some(id) = &ctx.params.id {
            return Some(id.to_string());
        }
        let result = ctx.result.as_ref()?;
        let descriptor = self.catalog.model(&ctx.model)?;
        RecordKey::from_record(result, &descriptor.primary_key).map(|key| key.to_string())
    }

    fn build_event(&self, ctx: &MiddlewareContext, event_type: AuditEventType) -> AuditEvent {
        let mut builder = AuditEvent::builder(event_type, &ctx.model, ctx.operation.as_str()).user(&ctx.user);

        if event_type == AuditEventType::BatchUpserted {
            if let Some(summary) = &ctx.result {
                if let Some(total) = summary.get("totalSuccess").and_then(Value::as_u64) {
                    builder = builder.row_count(total);
                }
                builder = builder.meta(summary.clone());
            }
        } else if let Some(key) = self.record_key(ctx) {
            builder = builder.record_key(key);
        }

        if let Some(data) = &ctx.params.data {
            builder = builder.fields_of(data);
            if self.logger.logs_payloads() {
                let omitted = self.policies.get_policy(&ctx.model).omit_fields(&ctx.user);
                builder = builder.payload(strip_omitted(data, &omitted));
            }
        }
        builder.build()
    }
}

/// Copy of `data` without the omitted fields, row by row for batches.
fn strip_omitted(data: &Value, omitted: &BTreeSet<String>) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !omitted.contains(k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        Value::Array(rows) => Value::Array(rows.iter().map(|row| strip_omitted(row, omitted)).collect()),
        other => other.clone(),
    }
}

#[async_trait]
impl Middleware for AuditMiddleware {
    async fn handle(&self, ctx: MiddlewareContext) -> Result<Flow, EngineError> {
        let Some(event_type) = Self::event_type(&ctx) else {
            return Ok(Flow::Continue(ctx));
        };
        let event = self.build_event(&ctx, event_type);
        if let Err(e) = self.logger.log(event).await {
            tracing::warn!(
                model = %ctx.model,
                operation = %ctx.operation,
                error = %e,
                "Failed to record audit event"
            );
        }
        Ok(Flow::Continue(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::AuditFilter;
    use crate::storage::MemoryStorage;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use warden_core::config::AuditConfig;
    use warden_core::{Catalog, Principal};
    use warden_policy::FnPolicy;

    const SCHEMA: &str = r#"
models:
  - name: Post
    fields:
      - { name: id, id: true }
      - { name: title }
"#;

    fn catalog() -> Arc<dyn SchemaCatalog> {
        Arc::new(Catalog::from_yaml(SCHEMA).unwrap())
    }

    fn logger(log_payloads: bool) -> Arc<AuditLogger> {
        let config = AuditConfig {
            log_payloads,
            ..AuditConfig::default()
        };
        Arc::new(AuditLogger::with_storage(config, Arc::new(MemoryStorage::new())))
    }

    fn ctx(operation: Operation) -> MiddlewareContext {
        MiddlewareContext::new("Post", operation, Principal::new("u1", "editor"))
    }

    #[tokio::test]
    async fn test_create_event_reads_key_from_result() {
        let logger = logger(false);
        let hook = AuditMiddleware::new(Arc::clone(&logger), catalog(), PolicyRegistry::new());
        let mut c = ctx(Operation::Create);
        c.params.data = Some(json!({"title": "Hello"}));
        c.result = Some(json!({"id": 7, "title": "Hello"}));

        hook.handle(c).await.unwrap();

        let events = logger.query(AuditFilter::default()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::RecordCreated);
        assert_eq!(events[0].record_key.as_deref(), Some("7"));
        assert_eq!(events[0].fields, vec!["title".to_string()]);
        assert!(events[0].payload.is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_and_payload() {
        let logger = logger(true);
        let hook = AuditMiddleware::new(Arc::clone(&logger), catalog(), PolicyRegistry::new());
        let mut c = ctx(Operation::Delete);
        c.params.id = Some(RecordKey::from(3i64));
        c.params.data = Some(json!({"deletedAt": "2026-01-01T00:00:00.000Z"}));
        c.soft_delete = true;

        hook.handle(c).await.unwrap();

        let events = logger.query(AuditFilter::default()).await.unwrap();
        assert_eq!(events[0].event_type, AuditEventType::RecordSoftDeleted);
        assert_eq!(events[0].record_key.as_deref(), Some("3"));
        assert_eq!(events[0].payload, Some(json!({"deletedAt": "2026-01-01T00:00:00.000Z"})));
    }

    #[tokio::test]
    async fn test_payload_drops_omitted_fields() {
        let logger = logger(true);
        let mut policies = PolicyRegistry::new();
        policies.register("Post", FnPolicy::new().with_omitted(["secret"]));
        let hook = AuditMiddleware::new(Arc::clone(&logger), catalog(), policies);

        let mut c = ctx(Operation::Update);
        c.params.id = Some(RecordKey::from("p1"));
        c.params.data = Some(json!({"title": "Hi", "secret": "s3cr3t"}));
        hook.handle(c).await.unwrap();

        let mut c = ctx(Operation::UpsertMany);
        c.params.data = Some(json!([{"id": "p2", "secret": "x"}, {"title": "b"}]));
        hook.handle(c).await.unwrap();

        let events = logger.query(AuditFilter::default()).await.unwrap();
        let payloads: Vec<_> = events.iter().filter_map(|e| e.payload.clone()).collect();
        assert!(payloads.contains(&json!({"title": "Hi"})));
        assert!(payloads.contains(&json!([{"id": "p2"}, {"title": "b"}])));
    }

    #[tokio::test]
    async fn test_batch_upsert_records_summary() {
        let logger = logger(false);
        let hook = AuditMiddleware::new(Arc::clone(&logger), catalog(), PolicyRegistry::new());
        let mut c = ctx(Operation::UpsertMany);
        c.params.data = Some(json!([{"title": "a"}, {"id": 1, "title": "b"}]));
        c.result = Some(json!({"created": 1, "updated": 1, "failed": [], "totalSuccess": 2, "totalFailed": 0}));

        hook.handle(c).await.unwrap();

        let events = logger.query(AuditFilter::default()).await.unwrap();
        assert_eq!(events[0].event_type, AuditEventType::BatchUpserted);
        assert_eq!(events[0].row_count, Some(2));
        assert!(events[0].record_key.is_none());
    }

    #[tokio::test]
    async fn test_reads_are_not_audited() {
        let logger = logger(false);
        let hook = AuditMiddleware::new(Arc::clone(&logger), catalog(), PolicyRegistry::new());
        let flow = hook.handle(ctx(Operation::GetMany)).await.unwrap();
        assert!(!flow.is_aborted());
        assert!(logger.query(AuditFilter::default()).await.unwrap().is_empty());
    }

    #[test]
    fn test_install_registers_mutations_only() {
        let pipeline = MiddlewarePipeline::new();
        install(&pipeline, logger(false), catalog(), PolicyRegistry::new());
        for op in AUDITED {
            assert_eq!(pipeline.chain_len(Hook::After, op, "Post"), 1);
        }
        assert_eq!(pipeline.chain_len(Hook::After, Operation::GetMany, "Post"), 0);
        assert_eq!(pipeline.chain_len(Hook::Before, Operation::Create, "Post"), 0);

        let disabled = MiddlewarePipeline::new();
        install(&disabled, Arc::new(AuditLogger::disabled()), catalog(), PolicyRegistry::new());
        assert_eq!(disabled.chain_len(Hook::After, Operation::Create, "Post"), 0);
    }
}
