//! Middleware shipped with the engine.

use super::{ANY_MODEL, Flow, Middleware, MiddlewareContext, MiddlewarePipeline, Operation};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use warden_core::config::{SoftDeleteConfig, TimestampsConfig};
use warden_core::{EngineConfig, EngineError, Predicate, SchemaCatalog};

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Register every built-in middleware enabled in `config`.
pub fn install(pipeline: &MiddlewarePipeline, config: &EngineConfig, catalog: Arc<dyn SchemaCatalog>) {
    if config.timestamps.enabled {
        Timestamps::new(config.timestamps.clone(), Arc::clone(&catalog)).install(pipeline);
    }
    if config.soft_delete.enabled {
        SoftDelete::new(config.soft_delete.clone(), catalog).install(pipeline);
    }
}

/// Fills creation/modification times and actors into mutation payloads.
pub struct Timestamps {
    config: TimestampsConfig,
    catalog: Arc<dyn SchemaCatalog>,
}

impl Timestamps {
    pub fn new(config: TimestampsConfig, catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self { config, catalog }
    }

    pub fn install(self, pipeline: &MiddlewarePipeline) {
        let this: Arc<dyn Middleware> = Arc::new(self);
        for op in [Operation::Create, Operation::Update, Operation::Upsert, Operation::UpsertMany] {
            pipeline.register_arc(super::Hook::Before, op, ANY_MODEL, Arc::clone(&this));
        }
    }

    fn stamp(&self, model: &str, row: &mut Map<String, Value>, creating: bool, actor: &str) {
        let Some(descriptor) = self.catalog.model(model) else {
            return;
        };
        let time = Value::String(now());
        let actor = Value::String(actor.to_string());
        let mut fill = |field: &str, value: &Value| {
            let declared = descriptor.field(field).is_some_and(|f| f.is_scalar());
            if declared && !row.contains_key(field) {
                row.insert(field.to_string(), value.clone());
            }
        };
        if creating {
            fill(&self.config.created_at, &time);
            fill(&self.config.created_by, &actor);
        }
        fill(&self.config.updated_at, &time);
        fill(&self.config.updated_by, &actor);
    }
}

#[async_trait]
impl Middleware for Timestamps {
    async fn handle(&self, mut ctx: MiddlewareContext) -> Result<Flow, EngineError> {
        let creating = ctx.operation != Operation::Update;
        let actor = ctx.user.id.clone();
        match ctx.params.data.as_mut() {
            Some(Value::Object(row)) => self.stamp(&ctx.model, row, creating, &actor),
            Some(Value::Array(rows)) => {
                for row in rows.iter_mut().filter_map(Value::as_object_mut) {
                    self.stamp(&ctx.model, row, creating, &actor);
                }
            }
            _ => {}
        }
        Ok(Flow::Continue(ctx))
    }
}

/// Turns deletes into updates of a marker column and hides marked rows
/// from reads.
pub struct SoftDelete {
    config: SoftDeleteConfig,
    catalog: Arc<dyn SchemaCatalog>,
}

impl SoftDelete {
    pub fn new(config: SoftDeleteConfig, catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self { config, catalog }
    }

    pub fn install(self, pipeline: &MiddlewarePipeline) {
        let this: Arc<dyn Middleware> = Arc::new(self);
        for op in [Operation::Delete, Operation::GetMany, Operation::Get, Operation::Count] {
            pipeline.register_arc(super::Hook::Before, op, ANY_MODEL, Arc::clone(&this));
        }
    }

    fn applies_to(&self, model: &str) -> bool {
        self.catalog
            .model(model)
            .is_some_and(|m| m.field(&self.config.field).is_some_and(|f| f.is_scalar()))
    }
}

#[async_trait]
impl Middleware for SoftDelete {
    async fn handle(&self, mut ctx: MiddlewareContext) -> Result<Flow, EngineError> {
        if !self.applies_to(&ctx.model) {
            return Ok(Flow::Continue(ctx));
        }
        let field = self.config.field.clone();
        if ctx.operation == Operation::Delete {
            let mut data = Map::new();
            data.insert(field, Value::String(now()));
            ctx.soft_delete = true;
            ctx.params.data = Some(Value::Object(data));
        } else {
            let mut hidden = Predicate::new();
            hidden.insert(field, Value::Null);
            ctx.params.add_where(hidden);
        }
        Ok(Flow::Continue(ctx))
    }
}
