//! Session directory and discovery candidates
//!
//! The directory maps a short code to the identifier of the Host serving it.
//! It lives behind the same key-value boundary as the sessions, so processes
//! sharing a data directory share registrations. When a code is not in the
//! directory, joiners fall back to probing identifiers derived from the code.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error};

use crate::errors::PersistenceError;
use crate::persistence::{load_json, save_json, KeyValueStore, SESSION_CODES_KEY};
use crate::store::SessionStore;
use crate::types::{PeerId, ShortCode};

/// Short code to Host identifier mapping
#[derive(Clone)]
pub struct SessionDirectory {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionDirectory {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn entries(&self) -> Result<BTreeMap<ShortCode, PeerId>, PersistenceError> {
        Ok(load_json(self.kv.as_ref(), SESSION_CODES_KEY)?.unwrap_or_default())
    }

    /// Register `code` as served by `host`, replacing any previous entry
    pub fn register(&self, code: &ShortCode, host: &PeerId) -> Result<(), PersistenceError> {
        let mut entries = self.entries()?;
        entries.insert(code.clone(), host.clone());
        save_json(self.kv.as_ref(), SESSION_CODES_KEY, &entries)?;
        debug!("Registered session code {} for host {}", code, host);
        Ok(())
    }

    /// Register every coded session in `store`; returns how many were registered
    pub fn register_all(&self, store: &SessionStore, host: &PeerId) -> Result<usize, PersistenceError> {
        let mut entries = self.entries()?;
        let mut count = 0;
        for code in store.sessions().filter_map(|s| s.short_code.as_ref()) {
            entries.insert(code.clone(), host.clone());
            count += 1;
        }
        if count > 0 {
            save_json(self.kv.as_ref(), SESSION_CODES_KEY, &entries)?;
        }
        Ok(count)
    }

    /// Host registered for `code`; storage failures read as a miss
    pub fn lookup(&self, code: &ShortCode) -> Option<PeerId> {
        match self.entries() {
            Ok(entries) => entries.get(code).cloned(),
            Err(e) => {
                error!("Failed to read session directory: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for SessionDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDirectory").finish_non_exhaustive()
    }
}

/// Identifiers to probe for a code that is not in the directory, in order
pub fn discovery_candidates(code: &ShortCode) -> Vec<PeerId> {
    let raw = code.as_str();
    let lower = raw.to_lowercase();
    let mut candidates: Vec<String> = ["host-", "session-", "qa-", "event-"]
        .iter()
        .map(|prefix| format!("{}{}", prefix, lower))
        .collect();

    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        candidates.push(format!("host{}", raw));
        candidates.push(format!("session{}", raw));
    }

    if raw.chars().count() > 10 && raw.contains('-') {
        candidates.push(raw.to_string());
    }

    let mut unique: Vec<PeerId> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let peer = PeerId::new(candidate);
        if !unique.contains(&peer) {
            unique.push(peer);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryKeyValueStore;
    use crate::store::Session;
    use crate::types::Timestamp;

    fn code(s: &str) -> ShortCode {
        ShortCode::normalize(s).unwrap()
    }

    fn names(candidates: Vec<PeerId>) -> Vec<String> {
        candidates.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_register_and_lookup_is_case_insensitive() {
        let directory = SessionDirectory::new(Arc::new(MemoryKeyValueStore::new()));
        assert!(directory.lookup(&code("abc123")).is_none());

        directory.register(&code("abc123"), &PeerId::new("H1")).unwrap();
        assert_eq!(directory.lookup(&code("ABC123")), Some(PeerId::new("H1")));

        directory.register(&code("ABC123"), &PeerId::new("H2")).unwrap();
        assert_eq!(directory.lookup(&code("abc123")), Some(PeerId::new("H2")));
    }

    #[test]
    fn test_shared_backing_store() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let writer = SessionDirectory::new(kv.clone());
        let reader = SessionDirectory::new(kv);

        let store: SessionStore = vec![
            Session::new("s1".into(), "A", Some(code("AAAAAA")), Timestamp::new(0)),
            Session::new("s2".into(), "B", None, Timestamp::new(0)),
        ]
        .into_iter()
        .collect();

        assert_eq!(writer.register_all(&store, &PeerId::new("H1")).unwrap(), 1);
        assert_eq!(reader.lookup(&code("aaaaaa")), Some(PeerId::new("H1")));
    }

    #[test]
    fn test_candidates_for_alphanumeric_code() {
        assert_eq!(
            names(discovery_candidates(&code("AB12CD"))),
            vec!["host-ab12cd", "session-ab12cd", "qa-ab12cd", "event-ab12cd"]
        );
    }

    #[test]
    fn test_candidates_for_numeric_code() {
        assert_eq!(
            names(discovery_candidates(&code("123456"))),
            vec![
                "host-123456",
                "session-123456",
                "qa-123456",
                "event-123456",
                "host123456",
                "session123456"
            ]
        );
    }

    #[test]
    fn test_candidates_for_peer_like_code() {
        let candidates = names(discovery_candidates(&code("abcd-efgh-ijkl")));
        assert_eq!(candidates.len(), 5);
        assert_eq!(candidates[4], "ABCD-EFGH-IJKL");

        let short = names(discovery_candidates(&code("ab-cd")));
        assert_eq!(short.len(), 4);
    }
}
