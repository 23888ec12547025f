use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use warden_audit::{AuditEventType, AuditFilter, AuditLogger};
use warden_core::config::{AuditConfig, EngineConfig};
use warden_core::{Catalog, Principal, SchemaCatalog};
use warden_runtime::{DryRunStore, Engine};

const SCHEMA: &str = r#"
models:
  - name: Post
    fields:
      - { name: id, id: true }
      - { name: title, required: true }
      - { name: deletedAt, type: DateTime }
"#;

fn engine(config: EngineConfig, logger: Arc<AuditLogger>) -> Engine {
    let catalog: Arc<dyn SchemaCatalog> = Arc::new(Catalog::from_yaml(SCHEMA).unwrap());
    let engine = Engine::builder(Arc::clone(&catalog), Arc::new(DryRunStore::new()))
        .config(config)
        .build();
    warden_audit::install(engine.pipeline(), logger, catalog, engine.policies().clone());
    engine
}

#[tokio::test]
async fn test_mutations_through_facade_are_audited() {
    let logger = Arc::new(AuditLogger::in_memory());
    let engine = engine(EngineConfig::default(), Arc::clone(&logger));
    let posts = engine.model("Post", Some(Principal::new("u1", "admin"))).unwrap();

    posts.create(&json!({"id": "p1", "title": "Hello"})).await.unwrap();
    posts.update("p1", &json!({"title": "Bye"})).await.unwrap();
    posts.get_many(Default::default()).await.unwrap();
    posts.delete("p1").await.unwrap();

    let events = logger.query(AuditFilter::default()).await.unwrap();
    let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            AuditEventType::RecordCreated,
            AuditEventType::RecordUpdated,
            AuditEventType::RecordDeleted,
        ]
    );
    assert!(events.iter().all(|e| e.user_id == "u1" && e.model == "Post"));
    assert_eq!(events[1].record_key.as_deref(), Some("p1"));
}

#[tokio::test]
async fn test_soft_delete_is_distinguished() {
    let mut config = EngineConfig::default();
    config.soft_delete.enabled = true;
    let logger = Arc::new(AuditLogger::in_memory());
    let engine = engine(config, Arc::clone(&logger));

    engine.model("Post", None).unwrap().delete("p5").await.unwrap();

    let filter = AuditFilter {
        event_type: Some(AuditEventType::RecordSoftDeleted),
        ..Default::default()
    };
    let events = logger.query(filter).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].record_key.as_deref(), Some("p5"));
}

#[tokio::test]
async fn test_file_backed_logger_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let logger = Arc::new(
        AuditLogger::new(AuditConfig {
            file: Some(path.clone()),
            ..AuditConfig::default()
        })
        .unwrap(),
    );
    let engine = engine(EngineConfig::default(), Arc::clone(&logger));

    engine
        .model("Post", None)
        .unwrap()
        .create(&json!({"id": "p2", "title": "x"}))
        .await
        .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains("\"record_created\""));
}
