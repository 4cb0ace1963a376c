// ABOUTME: Conversation metadata persistence
// ABOUTME: Store trait plus a file-backed implementation keeping one JSON document per conversation

use crate::model::ConversationRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

pub const META_FILE_NAME: &str = "meta.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert or replace a record
    async fn save(&self, record: &ConversationRecord) -> Result<()>;

    async fn load(&self, id: Uuid) -> Result<Option<ConversationRecord>>;

    /// Every stored record, in no particular order
    async fn list(&self) -> Result<Vec<ConversationRecord>>;

    /// Remove a record and anything stored alongside it; returns whether it existed
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Stores each conversation under `<root>/<id-hex>/meta.json`.
///
/// The per-conversation directory is shared with the engine's own persisted
/// state, so deleting a record removes that too. Writes to one conversation
/// are serialized; clones share the same locks.
#[derive(Debug, Clone)]
pub struct FileConversationStore {
    root: PathBuf,
    write_locks: Arc<StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl FileConversationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn conversation_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(id.simple().to_string())
    }

    fn meta_path(&self, id: Uuid) -> PathBuf {
        self.conversation_dir(id).join(META_FILE_NAME)
    }

    fn write_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(locks.entry(id).or_default())
    }
}

/// Write `bytes` to a uniquely named temp file in `dir`, then rename it over `target`
fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn save(&self, record: &ConversationRecord) -> Result<()> {
        let dir = self.conversation_dir(record.id);
        let target = self.meta_path(record.id);
        let json = serde_json::to_vec_pretty(record)?;

        let lock = self.write_lock(record.id);
        let _guard = lock.lock().await;
        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &json))
            .await
            .map_err(std::io::Error::other)??;

        debug!("Saved conversation {}", record.id);
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<ConversationRecord>> {
        match fs::read(self.meta_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<ConversationRecord>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|n| Uuid::try_parse(n).ok()) else {
                continue;
            };
            match self.load(id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable conversation {}: {}", id, e),
            }
        }
        Ok(records)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let lock = self.write_lock(id);
        let _guard = lock.lock().await;
        let removed = fs::remove_dir_all(self.conversation_dir(id)).await;
        self.write_locks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id);

        match removed {
            Ok(()) => {
                debug!("Deleted conversation {}", id);
                Ok(true)
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
