//! Configuration types for the Warden engine.
//!
//! Configuration is loaded from a YAML file (`warden.yaml`) that points at the
//! schema document and the policy file. Every section has defaults, so an
//! empty file is a valid configuration.

pub mod audit;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use audit::AuditConfig;

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pagination limits for list queries.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Bounds for selection/include trees.
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Mutation payload handling.
    #[serde(default)]
    pub mutation: MutationConfig,

    /// Built-in timestamp middleware.
    #[serde(default)]
    pub timestamps: TimestampsConfig,

    /// Built-in soft-delete middleware.
    #[serde(default)]
    pub soft_delete: SoftDeleteConfig,

    /// Audit logging.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Path to the schema document (YAML or JSON).
    #[serde(default)]
    pub schema_file: Option<PathBuf>,

    /// Path to the declarative policy file.
    #[serde(default)]
    pub policy_file: Option<PathBuf>,
}

/// Pagination configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Page size used when the caller gives no limit.
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Upper bound a requested limit is clamped to.
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl PaginationConfig {
    /// Effective page size for a requested limit.
    pub fn clamp(&self, requested: Option<u64>) -> u64 {
        requested
            .filter(|l| *l > 0)
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
    }
}

/// Selection tree configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Maximum relation depth of a dotted field or include path.
    #[serde(default = "default_selection_depth")]
    pub max_depth: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_depth: default_selection_depth(),
        }
    }
}

/// Mutation payload configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Fields that are never accepted from an update payload.
    #[serde(default = "default_system_managed")]
    pub system_managed_fields: Vec<String>,

    /// Maximum depth of nested relation creates.
    #[serde(default = "default_mutation_depth")]
    pub max_depth: usize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            system_managed_fields: default_system_managed(),
            max_depth: default_mutation_depth(),
        }
    }
}

/// Timestamp middleware configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_created_at")]
    pub created_at: String,
    #[serde(default = "default_updated_at")]
    pub updated_at: String,
    #[serde(default = "default_created_by")]
    pub created_by: String,
    #[serde(default = "default_updated_by")]
    pub updated_by: String,
}

impl Default for TimestampsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            created_at: default_created_at(),
            updated_at: default_updated_at(),
            created_by: default_created_by(),
            updated_by: default_updated_by(),
        }
    }
}

/// Soft-delete middleware configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Timestamp column marking a row as deleted.
    #[serde(default = "default_deleted_at")]
    pub field: String,
}

impl Default for SoftDeleteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            field: default_deleted_at(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_limit() -> u64 {
    25
}

fn default_max_limit() -> u64 {
    100
}

fn default_selection_depth() -> usize {
    5
}

fn default_mutation_depth() -> usize {
    8
}

fn default_system_managed() -> Vec<String> {
    vec!["createdAt".to_string(), "createdBy".to_string()]
}

fn default_created_at() -> String {
    "createdAt".to_string()
}

fn default_updated_at() -> String {
    "updatedAt".to_string()
}

fn default_created_by() -> String {
    "createdBy".to_string()
}

fn default_updated_by() -> String {
    "updatedBy".to_string()
}

fn default_deleted_at() -> String {
    "deletedAt".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid schema: {}", .problems.join("; "))]
    Schema { problems: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration and resolve `schema_file`/`policy_file` relative to
    /// the directory of the configuration file.
    pub fn load_with_context(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path)?;

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        config.schema_file = config.schema_file.map(|p| resolve(&base_dir, p));
        config.policy_file = config.policy_file.map(|p| resolve(&base_dir, p));
        if let Some(file) = config.audit.file.take() {
            config.audit.file = Some(resolve(&base_dir, file));
        }

        tracing::debug!(
            config = %path.display(),
            schema = ?config.schema_file,
            policies = ?config.policy_file,
            "Loaded engine configuration"
        );

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pagination.max_limit == 0 {
            return Err(ConfigError::Config(
                "pagination.max_limit must be greater than zero".to_string(),
            ));
        }
        if self.pagination.default_limit > self.pagination.max_limit {
            return Err(ConfigError::Config(format!(
                "pagination.default_limit ({}) exceeds pagination.max_limit ({})",
                self.pagination.default_limit, self.pagination.max_limit
            )));
        }
        if self.selection.max_depth == 0 || self.mutation.max_depth == 0 {
            return Err(ConfigError::Config(
                "selection.max_depth and mutation.max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() { path } else { base.join(path) }
}
