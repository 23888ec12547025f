//! Error types for audit logging.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to open audit storage: {0}")]
    InitializationFailed(String),

    #[error("Failed to write audit event: {0}")]
    LogFailed(String),

    #[error("Failed to query audit events: {0}")]
    QueryFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
