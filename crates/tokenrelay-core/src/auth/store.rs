//! Key-value stores backing the session.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse session file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Session store lock poisoned")]
    Poisoned,
}

/// Persistent string-to-string storage for session state.
///
/// Holds the two credentials plus any other session keys the application
/// chooses to keep; all of it goes on [`SessionStore::clear`].
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// An in-memory store for tests and short-lived processes.
#[derive(Default)]
pub struct MemorySessionStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        data.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        data.clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(data.keys().cloned().collect())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    values: BTreeMap<String, String>,
    updated_at: Option<DateTime<Utc>>,
}

/// A store persisted as JSON on disk, written through on every change.
pub struct FileSessionStore {
    path: PathBuf,
    file: Mutex<SessionFile>,
}

impl FileSessionStore {
    /// Open the session file, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let file = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            SessionFile::default()
        };
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the session was last written, if ever.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.file.lock().ok().and_then(|f| f.updated_at)
    }

    fn persist(&self, file: &mut SessionFile) -> Result<(), StoreError> {
        file.updated_at = Some(Utc::now());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(file)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let file = self.file.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(file.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut file = self.file.lock().map_err(|_| StoreError::Poisoned)?;
        file.values.insert(key.to_string(), value.to_string());
        self.persist(&mut file)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut file = self.file.lock().map_err(|_| StoreError::Poisoned)?;
        if file.values.remove(key).is_some() {
            self.persist(&mut file)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut file = self.file.lock().map_err(|_| StoreError::Poisoned)?;
        *file = SessionFile::default();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let file = self.file.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(file.values.keys().cloned().collect())
    }
}
