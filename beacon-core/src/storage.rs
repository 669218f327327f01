//! Identity persistence
//!
//! The SDK persists `{userId, anonymousId, userTraits}` as one JSON document
//! under a configurable key. The key-value backend is pluggable through the
//! [`Storage`] trait; [`Persistence`] wraps a backend and turns every failure
//! into a logged warning so callers never see storage errors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Traits;

/// Key-value backend for persisted state.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory storage. Clones share the same entries, so two SDK instances
/// built with clones of one `MemoryStorage` see each other's writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the key files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for `key`, with anything outside `[A-Za-z0-9_-]` replaced by `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Identity document written to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub anonymous_id: String,
    #[serde(default)]
    pub user_traits: Traits,
}

/// Storage backend bound to one key, with failures contained.
pub struct Persistence {
    storage: Arc<dyn Storage>,
    key: String,
    enabled: bool,
}

impl Persistence {
    pub fn new(storage: Arc<dyn Storage>, key: impl Into<String>, enabled: bool) -> Self {
        Self {
            storage,
            key: key.into(),
            enabled,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Load the persisted identity, if any.
    ///
    /// Returns `None` when persistence is disabled, nothing is stored, or the
    /// stored document cannot be read.
    pub fn load(&self) -> Option<PersistedState> {
        if !self.enabled {
            return None;
        }
        match self.try_load() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to load persisted data");
                None
            }
        }
    }

    fn try_load(&self) -> Result<Option<PersistedState>> {
        let Some(raw) = self.storage.get(&self.key)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Save `state`. Returns whether the write happened.
    pub fn save(&self, state: &PersistedState) -> bool {
        if !self.enabled {
            return false;
        }
        let result = serde_json::to_string(state)
            .map_err(Error::from)
            .and_then(|raw| self.storage.set(&self.key, &raw));
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to save persisted data");
                false
            }
        }
    }

    /// Remove persisted data. Runs even when persistence is disabled so a
    /// consent revocation always wipes what an earlier run may have written.
    pub fn clear(&self) -> bool {
        match self.storage.remove(&self.key) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to clear persisted data");
                false
            }
        }
    }
}
