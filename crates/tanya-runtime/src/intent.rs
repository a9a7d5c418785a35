//! UI intents
//!
//! Everything a user can ask of the runtime arrives as an [`Intent`] paired
//! with a oneshot reply. Intents are processed on the replication loop in
//! arrival order.

use tanya_core::{
    JoinLink, PeerId, QuestionId, Result, Role, Session, SessionId, SessionStore,
};
use tokio::sync::{mpsc, oneshot};

use crate::managers::ConnectionStats;

// ----------------------------------------------------------------------------
// Intents
// ----------------------------------------------------------------------------

/// A user-originated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Submit a question to the active session
    Ask { text: String },
    Upvote { question: QuestionId },
    React { question: QuestionId, emoji: String },
    /// Clear an emoji from a question (admin)
    Unreact { question: QuestionId, emoji: String },
    Comment { question: QuestionId, text: String },
    /// Remove a question (admin)
    Delete { question: QuestionId },
    /// Flip the answered flag (admin)
    ToggleAnswered { question: QuestionId },
    /// Create a session and make it active (admin)
    CreateSession { name: String },
    /// Remove a session (admin)
    DeleteSession { session: SessionId },
    /// Change the locally active session
    SwitchSession { session: SessionId },
    /// Switch every connected peer to a session (admin)
    ForceSwitch { session: SessionId },
    /// Find a session by short code, locally or through discovery
    JoinByCode { code: String },
    Status,
    Snapshot,
    Shutdown,
}

impl Intent {
    pub fn kind(&self) -> &'static str {
        match self {
            Intent::Ask { .. } => "ask",
            Intent::Upvote { .. } => "upvote",
            Intent::React { .. } => "react",
            Intent::Unreact { .. } => "unreact",
            Intent::Comment { .. } => "comment",
            Intent::Delete { .. } => "delete",
            Intent::ToggleAnswered { .. } => "toggle_answered",
            Intent::CreateSession { .. } => "create_session",
            Intent::DeleteSession { .. } => "delete_session",
            Intent::SwitchSession { .. } => "switch_session",
            Intent::ForceSwitch { .. } => "force_switch",
            Intent::JoinByCode { .. } => "join_by_code",
            Intent::Status => "status",
            Intent::Snapshot => "snapshot",
            Intent::Shutdown => "shutdown",
        }
    }

    /// The admin action this intent performs, if it is gated
    pub fn admin_action(&self) -> Option<&'static str> {
        match self {
            Intent::Unreact { .. } => Some("remove reactions"),
            Intent::Delete { .. } => Some("delete questions"),
            Intent::ToggleAnswered { .. } => Some("mark questions answered"),
            Intent::CreateSession { .. } => Some("create sessions"),
            Intent::DeleteSession { .. } => Some("delete sessions"),
            Intent::ForceSwitch { .. } => Some("force a session switch"),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Outcomes
// ----------------------------------------------------------------------------

/// What the runtime did with an intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    /// Applied to the local store
    Applied,
    /// Sent to the Host; its next snapshot carries the result
    Forwarded,
    /// Accepted but changed nothing
    Ignored(&'static str),
    SessionCreated(Session),
    Switched(SessionId),
    /// Discovery is running in the background
    JoinStarted,
    Status(RuntimeStatus),
    Snapshot {
        store: SessionStore,
        active: Option<SessionId>,
    },
    Stopped,
}

/// Point-in-time view of the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStatus {
    pub role: Role,
    pub local_peer: Option<PeerId>,
    pub host_peer: Option<PeerId>,
    /// Open links, inbound and outbound
    pub connections: usize,
    pub active: Option<SessionId>,
    pub sessions: usize,
    /// Shareable link for the active session, once a Host is known
    pub join_link: Option<JoinLink>,
    pub stats: ConnectionStats,
}

// ----------------------------------------------------------------------------
// Channel
// ----------------------------------------------------------------------------

/// An intent with its reply slot
#[derive(Debug)]
pub struct IntentRequest {
    pub intent: Intent,
    pub reply: oneshot::Sender<Result<IntentOutcome>>,
}

impl IntentRequest {
    pub fn new(intent: Intent) -> (Self, oneshot::Receiver<Result<IntentOutcome>>) {
        let (reply, rx) = oneshot::channel();
        (Self { intent, reply }, rx)
    }
}

pub type IntentSender = mpsc::Sender<IntentRequest>;
pub type IntentReceiver = mpsc::Receiver<IntentRequest>;
