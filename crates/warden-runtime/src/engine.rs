//! Engine assembly: catalog, policies, middleware and store in one place.

use crate::facade::ModelFacade;
use crate::middleware::{MiddlewarePipeline, builtin};
use crate::rls::RlsContext;
use crate::store::{Store, StoreRequest};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use warden_core::{EngineConfig, EngineError, Principal, SchemaCatalog};
use warden_policy::PolicyRegistry;
use warden_query::RelationshipResolver;

pub(crate) struct EngineInner {
    pub(crate) resolver: RelationshipResolver,
    pub(crate) policies: PolicyRegistry,
    pub(crate) pipeline: MiddlewarePipeline,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) config: EngineConfig,
}

/// Shared engine state. Cheap to clone; facades hold a reference to it.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn builder(catalog: Arc<dyn SchemaCatalog>, store: Arc<dyn Store>) -> EngineBuilder {
        EngineBuilder {
            catalog,
            store,
            policies: PolicyRegistry::new(),
            config: EngineConfig::default(),
            builtins: true,
        }
    }

    /// Facade over `model` acting as `user`, or as the system principal.
    pub fn model(&self, model: &str, user: Option<Principal>) -> Result<ModelFacade, EngineError> {
        self.inner.resolver.model(model)?;
        Ok(ModelFacade::new(
            Arc::clone(&self.inner),
            model.to_string(),
            user.unwrap_or_else(Principal::system),
        ))
    }

    pub fn pipeline(&self) -> &MiddlewarePipeline {
        &self.inner.pipeline
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.inner.policies
    }

    pub fn resolver(&self) -> &RelationshipResolver {
        &self.inner.resolver
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Run raw store requests in one transaction under `user`'s RLS context.
    /// The requests are passed through untranslated.
    pub async fn transaction(
        &self,
        user: Option<&Principal>,
        requests: Vec<StoreRequest>,
    ) -> Result<Vec<Value>, EngineError> {
        let system = Principal::system();
        let user = user.unwrap_or(&system);
        for request in &requests {
            self.inner.resolver.model(&request.model)?;
        }
        let rls = RlsContext::for_principal(user);
        debug!(user = %user.id, requests = requests.len(), "Running transaction");
        let results = self.inner.store.transaction(requests, &rls).await?;
        info!(user = %user.id, results = results.len(), "Transaction committed");
        Ok(results)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("models", &self.inner.resolver.catalog().model_names())
            .field("policies", &self.inner.policies)
            .field("pipeline", &self.inner.pipeline)
            .finish()
    }
}

pub struct EngineBuilder {
    catalog: Arc<dyn SchemaCatalog>,
    store: Arc<dyn Store>,
    policies: PolicyRegistry,
    config: EngineConfig,
    builtins: bool,
}

impl EngineBuilder {
    pub fn policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Skip the timestamp and soft-delete middleware regardless of config.
    pub fn without_builtins(mut self) -> Self {
        self.builtins = false;
        self
    }

    pub fn build(self) -> Engine {
        let pipeline = MiddlewarePipeline::new();
        if self.builtins {
            builtin::install(&pipeline, &self.config, Arc::clone(&self.catalog));
        }
        info!(
            models = self.catalog.model_names().len(),
            policies = self.policies.len(),
            "Engine ready"
        );
        Engine {
            inner: Arc::new(EngineInner {
                resolver: RelationshipResolver::new(self.catalog),
                policies: self.policies,
                pipeline,
                store: self.store,
                config: self.config,
            }),
        }
    }
}
