//! Error types for the Tanya protocol
//!
//! This module contains all error types used throughout the core protocol,
//! including transport errors, protocol decoding errors, user-input errors and
//! role errors, and the main TanyaError type that unifies them all.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Specific transport error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Transport failed to open: {reason}")]
    OpenFailed { reason: String },
    #[error("Connection failed to peer {peer_id}: {reason}")]
    ConnectionFailed { peer_id: String, reason: String },
    #[error("Peer unavailable: {peer_id}")]
    PeerUnavailable { peer_id: String },
    #[error("Peer identifier already taken: {peer_id}")]
    PeerIdTaken { peer_id: String },
    #[error("Invalid peer identifier {peer_id}: {reason}")]
    InvalidPeerId { peer_id: String, reason: String },
    #[error("Transport is not open")]
    NotOpen,
    #[error("Transport shutdown: {reason}")]
    Shutdown { reason: String },
}

/// Errors raised while encoding or decoding protocol messages
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid join link {link}: {reason}")]
    InvalidLink { link: String, reason: String },
}

/// User-input errors, rejected before any network or state effect
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Question text must not be empty")]
    EmptyQuestion,
    #[error("Comment text must not be empty")]
    EmptyComment,
    #[error("Session name must not be empty")]
    EmptySessionName,
    #[error("Emoji must not be empty")]
    EmptyEmoji,
    #[error("A session code is required")]
    MissingCode,
    #[error("A host identifier is required")]
    MissingHost,
    #[error("Invalid question id: {0}")]
    InvalidQuestionId(String),
    #[error("No active session")]
    NoActiveSession,
    #[error("Only admins can {action}")]
    AdminRequired { action: &'static str },
}

/// Role assignment errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleError {
    #[error("Role already fixed as {current}")]
    AlreadyAssigned { current: &'static str },
    #[error("This process is hosting and cannot join another host")]
    AlreadyHost,
    #[error("Already connected to a host")]
    AlreadyConnected,
    #[error("A join is already in progress")]
    JoinInProgress,
    #[error("Only the host can {action} while connected")]
    NotHost { action: &'static str },
}

/// Persistence boundary errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Storage I/O error for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Stored value for key {key} is not valid: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error type for the Tanya protocol
#[derive(Debug, thiserror::Error)]
pub enum TanyaError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("Role error: {0}")]
    Role(#[from] RoleError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Runtime stopped")]
    Stopped,
}

impl TanyaError {
    /// Whether the error is a user-input rejection that should be shown as a notice
    pub fn is_user_facing(&self) -> bool {
        matches!(self, TanyaError::Input(_) | TanyaError::Role(_))
    }
}

pub type Result<T> = core::result::Result<T, TanyaError>;
