//! Audit event types.
//!
//! One event per committed mutation, in the form
//! `[event - model - operation - user/role - key]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use warden_core::Principal;

/// Type of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RecordCreated,
    RecordUpdated,
    RecordDeleted,
    /// Delete carried out as an update of the soft-delete column.
    RecordSoftDeleted,
    RecordUpserted,
    /// One `upsertMany` call; per-row outcomes live in `meta`.
    BatchUpserted,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RecordCreated => write!(f, "CREATED"),
            Self::RecordUpdated => write!(f, "UPDATED"),
            Self::RecordDeleted => write!(f, "DELETED"),
            Self::RecordSoftDeleted => write!(f, "SOFT_DELETED"),
            Self::RecordUpserted => write!(f, "UPSERTED"),
            Self::BatchUpserted => write!(f, "BATCH_UPSERTED"),
        }
    }
}

/// An audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event_type: AuditEventType,

    /// Model the mutation targeted.
    pub model: String,

    /// Facade operation name (`create`, `upsertMany`, ...).
    pub operation: String,

    pub user_id: String,
    pub role: String,

    /// Display form of the record key, when one is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_key: Option<String>,

    /// Top-level payload fields the mutation touched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,

    /// The mutation payload itself. Only recorded when payload logging is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl AuditEvent {
    pub fn builder(
        event_type: AuditEventType,
        model: impl Into<String>,
        operation: impl Into<String>,
    ) -> AuditEventBuilder {
        AuditEventBuilder::new(event_type, model, operation)
    }

    /// Single-line rendering for console output.
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "[{}] {} model={} op={} user={} role={}",
            self.occurred_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.event_type,
            self.model,
            self.operation,
            self.user_id,
            self.role,
        );

        if let Some(ref key) = self.record_key {
            line.push_str(&format!(" key={}", key));
        }

        if !self.fields.is_empty() {
            line.push_str(&format!(" fields={}", self.fields.join(",")));
        }

        if let Some(rows) = self.row_count {
            line.push_str(&format!(" rows={}", rows));
        }

        line
    }
}

/// Builder for audit events.
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    pub fn new(event_type: AuditEventType, model: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            event: AuditEvent {
                event_id: Uuid::new_v4(),
                occurred_at: Utc::now(),
                event_type,
                model: model.into(),
                operation: operation.into(),
                user_id: String::new(),
                role: String::new(),
                record_key: None,
                fields: Vec::new(),
                payload: None,
                row_count: None,
                meta: None,
            },
        }
    }

    pub fn user(mut self, user: &Principal) -> Self {
        self.event.user_id = user.id.clone();
        self.event.role = user.role.clone();
        self
    }

    pub fn record_key(mut self, key: impl Into<String>) -> Self {
        self.event.record_key = Some(key.into());
        self
    }

    /// Record the touched field names of `data`; arrays contribute the
    /// union of their rows' fields.
    pub fn fields_of(mut self, data: &Value) -> Self {
        let mut fields: Vec<String> = Vec::new();
        let rows: Vec<&Value> = match data {
            Value::Array(rows) => rows.iter().collect(),
            other => vec![other],
        };
        for row in rows {
            if let Value::Object(map) = row {
                for key in map.keys() {
                    if !fields.contains(key) {
                        fields.push(key.clone());
                    }
                }
            }
        }
        self.event.fields = fields;
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.event.payload = Some(payload);
        self
    }

    pub fn row_count(mut self, count: u64) -> Self {
        self.event.row_count = Some(count);
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.event.meta = Some(meta);
        self
    }

    pub fn build(self) -> AuditEvent {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_event_builder() {
        let event = AuditEvent::builder(AuditEventType::RecordUpdated, "Post", "update")
            .user(&Principal::new("u1", "editor"))
            .record_key("42")
            .fields_of(&json!({"title": "x", "published": true}))
            .build();

        assert_eq!(event.user_id, "u1");
        assert_eq!(event.role, "editor");
        assert_eq!(event.record_key.as_deref(), Some("42"));
        assert_eq!(event.fields, vec!["published".to_string(), "title".to_string()]);
        assert!(event.payload.is_none());
    }

    #[test]
    fn test_fields_of_rows_are_unioned() {
        let event = AuditEvent::builder(AuditEventType::BatchUpserted, "Tag", "upsertMany")
            .fields_of(&json!([{"label": "a"}, {"id": 1, "label": "b"}]))
            .build();
        assert_eq!(event.fields, vec!["label".to_string(), "id".to_string()]);
    }

    #[test]
    fn test_log_line() {
        let event = AuditEvent::builder(AuditEventType::RecordSoftDeleted, "Post", "delete")
            .user(&Principal::new("u1", "admin"))
            .record_key("7")
            .build();

        let line = event.to_log_line();
        assert!(line.contains("SOFT_DELETED"));
        assert!(line.contains("model=Post"));
        assert!(line.contains("op=delete"));
        assert!(line.contains("user=u1"));
        assert!(line.contains("key=7"));
        assert!(!line.contains("rows="));
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let event = AuditEvent::builder(AuditEventType::RecordCreated, "Tag", "create")
            .user(&Principal::new("u1", "admin"))
            .build();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], json!("record_created"));
        assert!(value.get("payload").is_none());
        assert!(value.get("fields").is_none());

        let back: AuditEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
