//! Audit storage backends.

use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::logger::AuditFilter;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;
use warden_core::config::AuditConfig;

/// Trait for audit storage backends.
#[async_trait]
pub trait AuditStorage: Send + Sync {
    /// Store an audit event.
    async fn store(&self, event: AuditEvent) -> Result<(), AuditError>;

    /// Query audit events with filters.
    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError>;

    /// Get an audit event by ID.
    async fn get(&self, event_id: Uuid) -> Result<Option<AuditEvent>, AuditError>;
}

/// Pick a backend for `config`.
///
/// Disabled auditing discards events. With neither stdout nor a file
/// configured, events are kept in memory so they stay queryable.
pub fn create_storage(config: &AuditConfig) -> Result<Arc<dyn AuditStorage>, AuditError> {
    if !config.enabled {
        return Ok(Arc::new(NullStorage));
    }
    let storage: Arc<dyn AuditStorage> = match (&config.file, config.stdout) {
        (Some(path), true) => Arc::new(DualStorage::new(FileStorage::new(path)?)),
        (Some(path), false) => Arc::new(FileStorage::new(path)?),
        (None, true) => Arc::new(ConsoleStorage),
        (None, false) => Arc::new(MemoryStorage::new()),
    };
    Ok(storage)
}

/// Console storage (one line per event on stdout).
pub struct ConsoleStorage;

#[async_trait]
impl AuditStorage for ConsoleStorage {
    async fn store(&self, event: AuditEvent) -> Result<(), AuditError> {
        println!("{}", event.to_log_line());
        Ok(())
    }

    async fn query(&self, _filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        Ok(vec![])
    }

    async fn get(&self, _event_id: Uuid) -> Result<Option<AuditEvent>, AuditError> {
        Ok(None)
    }
}

/// Discards every event.
pub struct NullStorage;

#[async_trait]
impl AuditStorage for NullStorage {
    async fn store(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }

    async fn query(&self, _filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        Ok(vec![])
    }

    async fn get(&self, _event_id: Uuid) -> Result<Option<AuditEvent>, AuditError> {
        Ok(None)
    }
}

/// In-process event list.
#[derive(Default)]
pub struct MemoryStorage {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStorage for MemoryStorage {
    async fn store(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        Ok(filter.apply(events.iter().cloned()))
    }

    async fn get(&self, event_id: Uuid) -> Result<Option<AuditEvent>, AuditError> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        Ok(events.iter().find(|e| e.event_id == event_id).cloned())
    }
}

/// JSON Lines file storage. Queries read the file back.
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Open (or create) the log at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuditError::InitializationFailed(format!("{}: {}", parent.display(), e))
            })?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<AuditEvent>, AuditError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AuditError::QueryFailed(e.to_string())),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AuditError::from))
            .collect()
    }
}

#[async_trait]
impl AuditStorage for FileStorage {
    async fn store(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AuditError::LogFailed(e.to_string()))?;
        file.flush().await?;
        Ok(())
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        Ok(filter.apply(self.read_all().await?))
    }

    async fn get(&self, event_id: Uuid) -> Result<Option<AuditEvent>, AuditError> {
        Ok(self.read_all().await?.into_iter().find(|e| e.event_id == event_id))
    }
}

/// File storage that also echoes each event to stdout.
pub struct DualStorage {
    file: FileStorage,
    console: ConsoleStorage,
}

impl DualStorage {
    pub fn new(file: FileStorage) -> Self {
        Self {
            file,
            console: ConsoleStorage,
        }
    }
}

#[async_trait]
impl AuditStorage for DualStorage {
    async fn store(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.console.store(event.clone()).await?;
        self.file.store(event).await
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        self.file.query(filter).await
    }

    async fn get(&self, event_id: Uuid) -> Result<Option<AuditEvent>, AuditError> {
        self.file.get(event_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditEventType;
    use pretty_assertions::assert_eq;
    use warden_core::Principal;

    fn event(model: &str, user: &str) -> AuditEvent {
        AuditEvent::builder(AuditEventType::RecordCreated, model, "create")
            .user(&Principal::new(user, "editor"))
            .build()
    }

    #[tokio::test]
    async fn test_console_storage() {
        ConsoleStorage.store(event("Post", "u1")).await.unwrap();
        assert!(ConsoleStorage.query(AuditFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_storage_query() {
        let storage = MemoryStorage::new();
        storage.store(event("Post", "u1")).await.unwrap();
        storage.store(event("Tag", "u2")).await.unwrap();

        let filter = AuditFilter {
            model: Some("Tag".to_string()),
            ..Default::default()
        };
        let results = storage.query(filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].user_id, "u2");
        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn test_file_storage_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");
        let storage = FileStorage::new(&path).unwrap();

        let first = event("Post", "u1");
        let first_id = first.event_id;
        storage.store(first).await.unwrap();
        storage.store(event("Post", "u2")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        let reopened = FileStorage::new(&path).unwrap();
        let found = reopened.get(first_id).await.unwrap().unwrap();
        assert_eq!(found.user_id, "u1");

        let filter = AuditFilter {
            user_id: Some("u2".to_string()),
            ..Default::default()
        };
        assert_eq!(reopened.query(filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_storage_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("none.jsonl")).unwrap();
        assert!(storage.query(AuditFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_storage_by_config() {
        let disabled = AuditConfig {
            enabled: false,
            ..AuditConfig::default()
        };
        let storage = create_storage(&disabled).unwrap();
        storage.store(event("Post", "u1")).await.unwrap();
        assert!(storage.query(AuditFilter::default()).await.unwrap().is_empty());

        let in_memory = create_storage(&AuditConfig::default()).unwrap();
        in_memory.store(event("Post", "u1")).await.unwrap();
        assert_eq!(in_memory.query(AuditFilter::default()).await.unwrap().len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let dual = AuditConfig {
            stdout: true,
            file: Some(dir.path().join("audit.jsonl")),
            ..AuditConfig::default()
        };
        let storage = create_storage(&dual).unwrap();
        storage.store(event("Post", "u1")).await.unwrap();
        assert_eq!(storage.query(AuditFilter::default()).await.unwrap().len(), 1);
    }
}
