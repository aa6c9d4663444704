/// Durable pending-job cache
///
/// A single JSON document mapping prompt id to submission metadata, used
/// only to recover in-flight jobs after a restart. The cache is advisory:
/// the backend stays authoritative and recovery reconciles against it.
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Per-user application data directory.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ai-studio")
}

/// What we remember about a submitted job while it is in flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingEntry {
    pub prompt: String,
    pub model_id: i64,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
}

/// Key-value interface over the pending-job cache.
///
/// Implementations must treat `set`/`delete` as read-modify-write
/// transactions so two poll callbacks landing together cannot lose an
/// update.
pub trait PendingStore: Send + Sync {
    fn all(&self) -> Result<BTreeMap<String, PendingEntry>, StoreError>;
    fn get(&self, prompt_id: &str) -> Result<Option<PendingEntry>, StoreError>;
    fn set(&self, prompt_id: &str, entry: PendingEntry) -> Result<(), StoreError>;
    /// Returns whether an entry was actually removed.
    fn delete(&self, prompt_id: &str) -> Result<bool, StoreError>;
}

/// JSON-file backed store under the app data dir.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at the default location.
    pub fn default_location() -> Self {
        Self::new(app_data_dir().join("pending_jobs.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, PendingEntry>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let json = std::fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&json)?)
    }

    fn write_map(&self, map: &BTreeMap<String, PendingEntry>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(map)?)?;
        Ok(())
    }
}

impl PendingStore for JsonFileStore {
    fn all(&self) -> Result<BTreeMap<String, PendingEntry>, StoreError> {
        let _guard = self.lock.lock();
        self.read_map()
    }

    fn get(&self, prompt_id: &str) -> Result<Option<PendingEntry>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.read_map()?.remove(prompt_id))
    }

    fn set(&self, prompt_id: &str, entry: PendingEntry) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        map.insert(prompt_id.to_string(), entry);
        self.write_map(&map)
    }

    fn delete(&self, prompt_id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        let removed = map.remove(prompt_id).is_some();
        if removed {
            self.write_map(&map)?;
        }
        Ok(removed)
    }
}

/// In-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<BTreeMap<String, PendingEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingStore for MemoryStore {
    fn all(&self) -> Result<BTreeMap<String, PendingEntry>, StoreError> {
        Ok(self.map.lock().clone())
    }

    fn get(&self, prompt_id: &str) -> Result<Option<PendingEntry>, StoreError> {
        Ok(self.map.lock().get(prompt_id).cloned())
    }

    fn set(&self, prompt_id: &str, entry: PendingEntry) -> Result<(), StoreError> {
        self.map.lock().insert(prompt_id.to_string(), entry);
        Ok(())
    }

    fn delete(&self, prompt_id: &str) -> Result<bool, StoreError> {
        Ok(self.map.lock().remove(prompt_id).is_some())
    }
}
