//! Replication state
//!
//! One [`ReplicationContext`] owns everything the replication loop touches:
//! role, links, the session store, the active session and the collaborators
//! it reports to. It is only ever used from the loop task, so nothing in it is
//! locked.

use std::sync::Arc;

use rand::rngs::StdRng;
use tanya_core::{
    broadcast_sync, AdminGate, BroadcastReport, JoinLink, KeyValueStore, LocalOnly,
    MutationHandler, Notice, PeerId, Presenter, Replicated, RoleState, SessionDirectory,
    SessionId, SessionPersistence, SessionStore, ShortCode, StateMutator, TanyaConfig,
    TanyaError, TimeSource,
};
use tracing::{debug, error, info};

use crate::intent::RuntimeStatus;
use crate::managers::ConnectionManager;

// ----------------------------------------------------------------------------
// Collaborators
// ----------------------------------------------------------------------------

/// External collaborators injected into the context
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn KeyValueStore>,
    pub presenter: Arc<dyn Presenter>,
    pub admin: Arc<dyn AdminGate>,
    pub time: Arc<dyn TimeSource>,
}

// ----------------------------------------------------------------------------
// Replication Context
// ----------------------------------------------------------------------------

/// State owned by the replication loop
pub struct ReplicationContext {
    /// Role and identities
    pub(crate) role: RoleState,
    /// Live links
    pub(crate) connections: ConnectionManager,
    /// All sessions; replaced wholesale on a Client
    pub(crate) store: SessionStore,
    /// Requested active session, resolved against the store on read
    pub(crate) active: Option<SessionId>,
    /// Code being joined; selects the active session from the first snapshot
    pub(crate) joining: Option<ShortCode>,
    pub(crate) mutator: StateMutator,
    pub(crate) handler: Box<dyn MutationHandler>,
    pub(crate) persistence: SessionPersistence,
    pub(crate) directory: SessionDirectory,
    pub(crate) presenter: Arc<dyn Presenter>,
    pub(crate) admin: Arc<dyn AdminGate>,
    pub(crate) config: TanyaConfig,
    pub(crate) rng: StdRng,
}

impl ReplicationContext {
    /// Create a context, loading any persisted sessions
    pub fn new(config: TanyaConfig, collaborators: Collaborators, rng: StdRng) -> Self {
        let persistence = SessionPersistence::new(collaborators.storage.clone());
        let store = match persistence.load() {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to load sessions, starting empty: {}", e);
                SessionStore::new()
            }
        };

        let handler: Box<dyn MutationHandler> = if config.replication.enabled {
            Box::new(Replicated)
        } else {
            Box::new(LocalOnly)
        };
        debug!(
            "Replication context using {} handler with {} stored sessions",
            handler.name(),
            store.len()
        );

        Self {
            role: RoleState::new(),
            connections: ConnectionManager::new(),
            store,
            active: None,
            joining: None,
            mutator: StateMutator::new(collaborators.time),
            handler,
            persistence,
            directory: SessionDirectory::new(collaborators.storage),
            presenter: collaborators.presenter,
            admin: collaborators.admin,
            config,
            rng,
        }
    }

    pub fn role(&self) -> &RoleState {
        &self.role
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// The active session resolved against the current store
    pub fn active_session(&self) -> Option<SessionId> {
        self.store.resolve_active(self.active.as_ref())
    }

    /// Request an active session without checking it exists
    pub fn set_active(&mut self, session: Option<SessionId>) {
        self.active = session;
    }

    pub fn set_local_peer(&mut self, peer: PeerId) {
        self.role.set_local_peer(peer);
    }

    /// Prepare the store of an authoritative process: ensure the default
    /// session exists and clear expired ones, then render
    pub fn bootstrap(&mut self) {
        if self.role.role().is_authoritative() {
            let now = self.mutator.now();
            let created = self
                .store
                .ensure_default(&self.config.replication.default_session_name, now);
            let expired = self
                .mutator
                .reset_expired(&mut self.store, self.config.replication.session_duration());
            if created || expired.is_applied() {
                self.persistence.save_or_log(&self.store);
            }
        }
        self.render();
    }

    /// Persist, render and replicate after a local change
    pub(crate) fn commit(&mut self) {
        self.persistence.save_or_log(&self.store);
        self.render();
        if self.handler.replicates() {
            self.broadcast();
        }
    }

    pub(crate) fn render(&self) {
        let active = self.active_session();
        self.presenter.render_all(&self.store, active.as_ref());
    }

    /// Push the full store to every open inbound link
    pub(crate) fn broadcast(&self) -> BroadcastReport {
        let active = self.active_session();
        broadcast_sync(
            self.role.role(),
            self.connections.inbound(),
            &self.store,
            active.as_ref(),
        )
    }

    /// Surface a rejection and hand the error back
    pub(crate) fn reject(&self, error: TanyaError) -> TanyaError {
        info!("Rejected: {}", error);
        self.presenter.notify(Notice::Rejected {
            reason: error.to_string(),
        });
        error
    }

    pub(crate) fn notify(&self, notice: Notice) {
        self.presenter.notify(notice);
    }

    /// Shareable link for `session`, once a Host identity is known
    pub fn join_link(&self, session: &SessionId) -> Option<JoinLink> {
        let host = self.role.host_peer()?.clone();
        match JoinLink::new(&self.config.link.base_url, Some(host), Some(session.clone())) {
            Ok(link) => Some(link),
            Err(e) => {
                error!("Cannot build join link: {}", e);
                None
            }
        }
    }

    pub fn status(&self) -> RuntimeStatus {
        let active = self.active_session();
        RuntimeStatus {
            role: self.role.role(),
            local_peer: self.role.local_peer().cloned(),
            host_peer: self.role.host_peer().cloned(),
            connections: self.connections.open_count(),
            join_link: active.as_ref().and_then(|id| self.join_link(id)),
            active,
            sessions: self.store.len(),
            stats: self.connections.get_statistics().clone(),
        }
    }
}

impl std::fmt::Debug for ReplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationContext")
            .field("role", &self.role)
            .field("connections", &self.connections)
            .field("sessions", &self.store.len())
            .field("active", &self.active)
            .field("handler", &self.handler.name())
            .finish_non_exhaustive()
    }
}
