//! Client-side key/value stores for the token and the cached user.
//!
//! DESIGN
//! ======
//! Two independent stores: a durable one holding the bearer token and a
//! session-scoped one holding the last known [`User`] as JSON. There is no
//! atomicity across them; callers order their writes.
//!
//! ERROR HANDLING
//! ==============
//! Raw stores return [`StorageError`]. [`ClientStorage`] readers degrade to
//! "absent" and log, since a corrupted snapshot must never block startup.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{error, warn};

use super::types::User;

pub const TOKEN_KEY: &str = "token";
pub const CURRENT_USER_KEY: &str = "currentUser";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failed: {0}")]
    Io(#[from] io::Error),
    #[error("stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Minimal string store with browser-storage semantics.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns a [`StorageError`] if the value cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing medium rejects the removal.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// One file per key under `dir`. Writes go through a temp file and rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!(".{key}.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// CLIENT STORAGE
// =============================================================================

/// The token store and the user-snapshot store, bound to their fixed keys.
#[derive(Clone)]
pub struct ClientStorage {
    durable: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
}

impl ClientStorage {
    #[must_use]
    pub fn new(durable: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, session }
    }

    /// Two fresh in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// File-backed stores: the token under `dir`, the snapshot under
    /// `dir/session`.
    #[must_use]
    pub fn on_disk(dir: &Path) -> Self {
        Self::new(Arc::new(FileStore::new(dir)), Arc::new(FileStore::new(dir.join("session"))))
    }

    /// The persisted token. Unreadable or empty counts as absent.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        match self.durable.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                error!(error = %e, "failed to read persisted token");
                None
            }
        }
    }

    /// # Errors
    ///
    /// Returns a [`StorageError`] if the token cannot be persisted.
    pub fn set_token(&self, token: &str) -> Result<(), StorageError> {
        self.durable.set(TOKEN_KEY, token)
    }

    /// The cached user snapshot. A corrupted snapshot counts as absent.
    #[must_use]
    pub fn cached_user(&self) -> Option<User> {
        let raw = match self.session.get(CURRENT_USER_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                error!(error = %e, "failed to read cached user");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                error!(error = %e, "error parsing cached user");
                None
            }
        }
    }

    /// # Errors
    ///
    /// Returns a [`StorageError`] if the snapshot cannot be serialized or written.
    pub fn cache_user(&self, user: &User) -> Result<(), StorageError> {
        let json = serde_json::to_string(user)?;
        self.session.set(CURRENT_USER_KEY, &json)
    }

    /// Remove the persisted token, logging failures.
    pub fn clear_token(&self) {
        if let Err(e) = self.durable.remove(TOKEN_KEY) {
            warn!(error = %e, "failed to remove persisted token");
        }
    }

    /// Remove both the token and the snapshot, logging failures.
    pub fn clear_auth(&self) {
        self.clear_token();
        if let Err(e) = self.session.remove(CURRENT_USER_KEY) {
            warn!(error = %e, "failed to remove cached user");
        }
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
