//! The replicated session store
//!
//! The store is the unit of replication: it is always serialized in full and
//! replaced wholesale on clients. Sessions are kept in id order so that a
//! serialized store is byte-for-byte reproducible.

use core::time::Duration;
use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::session::Session;
use crate::types::{SessionId, ShortCode, Timestamp};

/// Mapping of session id to session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionStore {
    sessions: BTreeMap<SessionId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Insert or replace the session stored under its id
    pub fn insert(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.id.clone(), session)
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &SessionId> {
        self.sessions.keys()
    }

    // ------------------------------------------------------------------------
    // Bootstrap and resolution
    // ------------------------------------------------------------------------

    /// Create the bootstrap session if the store is empty
    ///
    /// Returns true when a session was created.
    pub fn ensure_default(&mut self, name: &str, now: Timestamp) -> bool {
        if !self.is_empty() {
            return false;
        }
        self.insert(Session::new(SessionId::default_session(), name, None, now));
        true
    }

    /// Resolve the active session: the requested id if present, else the
    /// bootstrap session, else the first session by id order
    pub fn resolve_active(&self, requested: Option<&SessionId>) -> Option<SessionId> {
        if let Some(id) = requested {
            if self.contains(id) {
                return Some(id.clone());
            }
        }
        let default = SessionId::default_session();
        if self.contains(&default) {
            return Some(default);
        }
        self.ids().next().cloned()
    }

    /// Find a session by exact short code, falling back to a name fragment match
    pub fn find_by_code(&self, code: &ShortCode) -> Option<&Session> {
        self.sessions()
            .find(|s| s.short_code.as_ref() == Some(code))
            .or_else(|| self.sessions().find(|s| s.matches_code(code)))
    }

    pub fn short_code_in_use(&self, code: &ShortCode) -> bool {
        self.sessions().any(|s| s.short_code.as_ref() == Some(code))
    }

    /// Generate a short code no session currently uses
    pub fn unique_short_code<R: Rng + ?Sized>(&self, rng: &mut R) -> ShortCode {
        loop {
            let code = ShortCode::generate(rng);
            if !self.short_code_in_use(&code) {
                return code;
            }
        }
    }

    /// A `session-<millis>` id not yet present, bumping the millis on collision
    pub fn unique_session_id(&self, now: Timestamp) -> SessionId {
        let mut millis = now.as_millis();
        loop {
            let id = SessionId::from_timestamp(Timestamp::new(millis));
            if !self.contains(&id) {
                return id;
            }
            millis += 1;
        }
    }

    // ------------------------------------------------------------------------
    // Expiry
    // ------------------------------------------------------------------------

    /// Reset every session older than `duration`; returns the ids that were reset
    pub fn reset_expired(&mut self, now: Timestamp, duration: Duration) -> Vec<SessionId> {
        let mut reset = Vec::new();
        for session in self.sessions.values_mut() {
            if session.is_expired(now, duration) {
                info!(
                    "Session {} expired after {:?}, clearing {} questions",
                    session.id,
                    duration,
                    session.questions.len()
                );
                session.reset(now);
                reset.push(session.id.clone());
            }
        }
        reset
    }
}

impl FromIterator<Session> for SessionStore {
    fn from_iter<I: IntoIterator<Item = Session>>(iter: I) -> Self {
        Self {
            sessions: iter.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }
}
