//! Audit logger.

use crate::error::AuditError;
use crate::event::{AuditEvent, AuditEventType};
use crate::storage::{AuditStorage, MemoryStorage, NullStorage, create_storage};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;
use warden_core::config::AuditConfig;

/// Writes audit events to the configured storage.
pub struct AuditLogger {
    config: AuditConfig,
    storage: Arc<dyn AuditStorage>,
}

impl AuditLogger {
    /// Create a logger whose storage is chosen from `config`.
    pub fn new(config: AuditConfig) -> Result<Self, AuditError> {
        let storage = create_storage(&config)?;
        Ok(Self { config, storage })
    }

    /// Create a logger with a custom storage backend.
    pub fn with_storage(config: AuditConfig, storage: Arc<dyn AuditStorage>) -> Self {
        Self { config, storage }
    }

    /// Create a disabled (no-op) logger.
    pub fn disabled() -> Self {
        Self {
            config: AuditConfig {
                enabled: false,
                ..Default::default()
            },
            storage: Arc::new(NullStorage),
        }
    }

    /// Create a logger keeping events in memory.
    pub fn in_memory() -> Self {
        Self::with_storage(AuditConfig::default(), Arc::new(MemoryStorage::new()))
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether events should carry the mutation payload.
    pub fn logs_payloads(&self) -> bool {
        self.config.log_payloads
    }

    /// Log an audit event.
    pub async fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        if !self.config.enabled {
            return Ok(());
        }

        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            model = %event.model,
            operation = %event.operation,
            user = %event.user_id,
            role = %event.role,
            "Audit event"
        );

        self.storage.store(event).await
    }

    /// Query audit events.
    pub async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        self.storage.query(filter).await
    }

    /// Get a specific audit event.
    pub async fn get(&self, event_id: Uuid) -> Result<Option<AuditEvent>, AuditError> {
        self.storage.get(event_id).await
    }

    /// The last `limit` events recorded against `model`.
    pub async fn recent_for_model(&self, model: &str, limit: usize) -> Result<Vec<AuditEvent>, AuditError> {
        let events = self
            .query(AuditFilter {
                model: Some(model.to_string()),
                ..Default::default()
            })
            .await?;
        let skip = events.len().saturating_sub(limit);
        Ok(events.into_iter().skip(skip).collect())
    }
}

/// Filter for querying audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub model: Option<String>,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub event_type: Option<AuditEventType>,
    pub record_key: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if self.model.as_ref().is_some_and(|m| *m != event.model) {
            return false;
        }
        if self.user_id.as_ref().is_some_and(|u| *u != event.user_id) {
            return false;
        }
        if self.role.as_ref().is_some_and(|r| *r != event.role) {
            return false;
        }
        if self.event_type.is_some_and(|t| t != event.event_type) {
            return false;
        }
        if self.record_key.is_some() && self.record_key != event.record_key {
            return false;
        }
        if self.start_time.is_some_and(|start| event.occurred_at < start) {
            return false;
        }
        if self.end_time.is_some_and(|end| event.occurred_at > end) {
            return false;
        }
        true
    }

    /// Filter `events` then apply offset and limit.
    pub fn apply(&self, events: impl IntoIterator<Item = AuditEvent>) -> Vec<AuditEvent> {
        events
            .into_iter()
            .filter(|e| self.matches(e))
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use warden_core::Principal;

    fn event(event_type: AuditEventType, model: &str, key: &str) -> AuditEvent {
        AuditEvent::builder(event_type, model, "update")
            .user(&Principal::new("u1", "editor"))
            .record_key(key)
            .build()
    }

    #[tokio::test]
    async fn test_disabled_logger() {
        let logger = AuditLogger::disabled();
        assert!(!logger.is_enabled());
        logger.log(event(AuditEventType::RecordUpdated, "Post", "1")).await.unwrap();
        assert!(logger.query(AuditFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_and_get() {
        let logger = AuditLogger::in_memory();
        let e = event(AuditEventType::RecordCreated, "Post", "1");
        let id = e.event_id;
        logger.log(e).await.unwrap();

        let found = logger.get(id).await.unwrap().unwrap();
        assert_eq!(found.record_key.as_deref(), Some("1"));
        assert!(logger.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_for_model_keeps_latest() {
        let logger = AuditLogger::in_memory();
        for key in ["1", "2", "3"] {
            logger.log(event(AuditEventType::RecordUpdated, "Post", key)).await.unwrap();
        }
        logger.log(event(AuditEventType::RecordUpdated, "Tag", "9")).await.unwrap();

        let recent = logger.recent_for_model("Post", 2).await.unwrap();
        let keys: Vec<_> = recent.iter().filter_map(|e| e.record_key.clone()).collect();
        assert_eq!(keys, vec!["2".to_string(), "3".to_string()]);
    }

    #[test]
    fn test_filter_paging_and_type() {
        let events = vec![
            event(AuditEventType::RecordCreated, "Post", "1"),
            event(AuditEventType::RecordDeleted, "Post", "2"),
            event(AuditEventType::RecordDeleted, "Post", "3"),
            event(AuditEventType::RecordDeleted, "Post", "4"),
        ];
        let filter = AuditFilter {
            event_type: Some(AuditEventType::RecordDeleted),
            offset: Some(1),
            limit: Some(1),
            ..Default::default()
        };
        let results = filter.apply(events);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record_key.as_deref(), Some("3"));
    }

    #[test]
    fn test_filter_time_window() {
        let e = event(AuditEventType::RecordCreated, "Post", "1");
        let after = AuditFilter {
            start_time: Some(e.occurred_at + chrono::Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!after.matches(&e));
        let around = AuditFilter {
            start_time: Some(e.occurred_at - chrono::Duration::seconds(1)),
            end_time: Some(e.occurred_at + chrono::Duration::seconds(1)),
            ..Default::default()
        };
        assert!(around.matches(&e));
    }
}
