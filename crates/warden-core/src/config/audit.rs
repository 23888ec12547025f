//! Audit logging configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether to echo events to stdout.
    #[serde(default)]
    pub stdout: bool,

    /// JSON Lines file to append events to.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Whether to record the mutation payload on events (may contain sensitive data).
    #[serde(default)]
    pub log_payloads: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            stdout: false,
            file: None,
            log_payloads: false,
        }
    }
}

fn default_enabled() -> bool {
    true
}
