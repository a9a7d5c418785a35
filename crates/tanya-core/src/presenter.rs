//! Render and role-gating boundaries
//!
//! The replication core never draws anything. It tells a [`Presenter`] to
//! re-render after every local mutation or snapshot replacement, and raises
//! [`Notice`]s for things the user has to see.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::store::SessionStore;
use crate::types::{PeerId, SessionId, ShortCode};

// ----------------------------------------------------------------------------
// Notices
// ----------------------------------------------------------------------------

/// User-visible notices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The transport opened and this process is hosting
    Hosting { peer: PeerId },
    /// The transport could not open; running local-only
    Offline { reason: String },
    /// Connected to a Host
    Connected { host: PeerId },
    /// The link to the Host dropped
    Disconnected { host: PeerId },
    /// Dialing the Host failed
    ConnectionFailed { host: PeerId, reason: String },
    /// Retrying a dropped Host link
    Reconnecting { host: PeerId, attempt: u32 },
    /// Join-by-code exhausted every lookup
    SessionNotFound { code: ShortCode },
    /// The active session changed
    SessionSwitched { session: SessionId },
    /// A session was created locally
    SessionCreated { session: SessionId, code: ShortCode },
    /// An intent was rejected before having any effect
    Rejected { reason: String },
}

// ----------------------------------------------------------------------------
// Presenter
// ----------------------------------------------------------------------------

/// Render collaborator called by the replication core
pub trait Presenter: Send + Sync {
    /// Redraw everything from the current store
    fn render_all(&self, store: &SessionStore, active: Option<&SessionId>);

    /// Surface a notice to the user
    fn notify(&self, notice: Notice);
}

/// Presenter that draws nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn render_all(&self, _store: &SessionStore, _active: Option<&SessionId>) {}
    fn notify(&self, _notice: Notice) {}
}

/// Presenter that records renders and notices, for tests and tooling
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    renders: Arc<Mutex<Vec<(SessionStore, Option<SessionId>)>>>,
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_count(&self) -> usize {
        self.renders.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Store and active session passed to the most recent render
    pub fn last_render(&self) -> Option<(SessionStore, Option<SessionId>)> {
        self.renders.lock().ok().and_then(|r| r.last().cloned())
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl Presenter for RecordingPresenter {
    fn render_all(&self, store: &SessionStore, active: Option<&SessionId>) {
        if let Ok(mut renders) = self.renders.lock() {
            renders.push((store.clone(), active.cloned()));
        }
    }

    fn notify(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

// ----------------------------------------------------------------------------
// Admin Gate
// ----------------------------------------------------------------------------

/// Externally owned capability deciding whether the local user is an admin
pub trait AdminGate: Send + Sync {
    fn is_admin(&self) -> bool;
}

/// Shared, switchable admin flag
#[derive(Debug, Clone, Default)]
pub struct AdminFlag {
    admin: Arc<AtomicBool>,
}

impl AdminFlag {
    pub fn new(admin: bool) -> Self {
        Self {
            admin: Arc::new(AtomicBool::new(admin)),
        }
    }

    pub fn set(&self, admin: bool) {
        self.admin.store(admin, Ordering::SeqCst);
    }
}

impl AdminGate for AdminFlag {
    fn is_admin(&self) -> bool {
        self.admin.load(Ordering::SeqCst)
    }
}
