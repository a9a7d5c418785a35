//! Persistence boundary
//!
//! Storage is a flat key-value space with fixed key names. Reads and writes are
//! synchronous and treated as always available; callers log failed saves and
//! carry on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::errors::PersistenceError;
use crate::store::SessionStore;

/// Key under which the session store is saved
pub const SESSIONS_KEY: &str = "qa_sessions";

/// Key under which the short-code directory is saved
pub const SESSION_CODES_KEY: &str = "qa_session_codes";

// ----------------------------------------------------------------------------
// Key-Value Store
// ----------------------------------------------------------------------------

/// String key-value storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// Process-local key-value store
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Load a JSON value stored under `key`
pub fn load_json<T: DeserializeOwned>(
    kv: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, PersistenceError> {
    match kv.get(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| PersistenceError::Corrupt {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Store a value as JSON under `key`
pub fn save_json<T: Serialize>(
    kv: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), PersistenceError> {
    let raw = serde_json::to_string(value).map_err(|source| PersistenceError::Corrupt {
        key: key.to_string(),
        source,
    })?;
    kv.put(key, &raw)
}

// ----------------------------------------------------------------------------
// Session Persistence
// ----------------------------------------------------------------------------

/// Saves and restores the session store
#[derive(Clone)]
pub struct SessionPersistence {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionPersistence {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// The underlying key-value store
    pub fn backend(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.kv)
    }

    /// Load the stored sessions, empty if nothing was saved yet
    pub fn load(&self) -> Result<SessionStore, PersistenceError> {
        Ok(load_json(self.kv.as_ref(), SESSIONS_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, store: &SessionStore) -> Result<(), PersistenceError> {
        save_json(self.kv.as_ref(), SESSIONS_KEY, store)?;
        debug!("Saved {} sessions", store.len());
        Ok(())
    }

    /// Save, logging instead of propagating failures
    pub fn save_or_log(&self, store: &SessionStore) {
        if let Err(e) = self.save(store) {
            error!("Failed to save sessions: {}", e);
        }
    }
}

impl std::fmt::Debug for SessionPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPersistence").finish_non_exhaustive()
    }
}
