//! File-backed key-value storage
//!
//! Each key lives in `<data_dir>/<key>.json`. Writes go to a sibling temp
//! file first and are renamed into place so a crash never leaves a torn value.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tanya_core::{KeyValueStore, PersistenceError};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| PersistenceError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.root.join(format!("{}.json", file))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        let io = |source| PersistenceError::Io {
            key: key.to_string(),
            source,
        };

        std::fs::write(&staging, value).map_err(io)?;
        std::fs::rename(&staging, &path).map_err(io)?;
        debug!("Stored {} bytes under {}", value.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tanya_core::{Session, SessionId, SessionPersistence, SessionStore, Timestamp};

    #[test]
    fn test_missing_key_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::open(dir.path()).unwrap();
        assert_eq!(store.get("qa_sessions").unwrap(), None);
    }

    #[test]
    fn test_put_then_get_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::open(dir.path()).unwrap();

        store.put("qa_session_codes", "{\"ABC123\":\"ws://h\"}").unwrap();
        store.put("qa_session_codes", "{}").unwrap();
        assert_eq!(store.get("qa_session_codes").unwrap().as_deref(), Some("{}"));
        assert!(dir.path().join("qa_session_codes.json").exists());
        assert!(!dir.path().join("qa_session_codes.json.tmp").exists());
    }

    #[test]
    fn test_keys_cannot_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::open(dir.path()).unwrap();
        store.put("../outside", "x").unwrap();
        assert!(dir.path().join("___outside.json").exists());
        assert_eq!(store.get("../outside").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_open_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileKeyValueStore::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(store.root(), nested.as_path());
    }

    #[test]
    fn test_session_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut sessions = SessionStore::new();
        sessions.insert(Session::new(
            SessionId::default_session(),
            "Main Session",
            None,
            Timestamp::new(1_000),
        ));

        let first = SessionPersistence::new(Arc::new(FileKeyValueStore::open(dir.path()).unwrap()));
        first.save(&sessions).unwrap();

        let second = SessionPersistence::new(Arc::new(FileKeyValueStore::open(dir.path()).unwrap()));
        assert_eq!(second.load().unwrap(), sessions);
    }
}
