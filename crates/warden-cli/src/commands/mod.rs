//! CLI command implementations.

pub mod check;
pub mod translate;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use warden_core::{Catalog, EngineConfig};
use warden_policy::{PolicyDocument, PolicyRegistry};

/// Everything an engine needs, loaded from one configuration file.
pub struct Loaded {
    pub config: EngineConfig,
    pub catalog: Arc<Catalog>,
    pub policies: PolicyRegistry,
}

/// Load the configuration plus the schema and policy files it names.
pub fn load(config_path: &Path) -> Result<Loaded> {
    let config = EngineConfig::load_with_context(config_path)
        .with_context(|| format!("Failed to load configuration {}", config_path.display()))?;

    let schema_file = config
        .schema_file
        .clone()
        .context("Configuration does not name a schema_file")?;
    let catalog = Catalog::from_file(&schema_file)
        .with_context(|| format!("Failed to load schema {}", schema_file.display()))?;

    let policies = match &config.policy_file {
        Some(path) => {
            let doc = PolicyDocument::from_file(path)
                .with_context(|| format!("Failed to load policies {}", path.display()))?;
            PolicyRegistry::from_document(doc)
        }
        None => PolicyRegistry::new(),
    };

    Ok(Loaded {
        config,
        catalog: Arc::new(catalog),
        policies,
    })
}
