//! Data-channel message taxonomy
//!
//! Every message is a JSON object tagged by `type`, carried as one text frame.
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;
use crate::store::SessionStore;
use crate::types::{QuestionId, SessionId};

// ----------------------------------------------------------------------------
// Reaction Action
// ----------------------------------------------------------------------------

/// Whether a reaction message adds or clears an emoji
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionAction {
    Add,
    Remove,
}

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// Closed set of messages exchanged between Host and Clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Client asks for a full snapshot
    RequestSync,
    /// Full snapshot pushed by the Host
    #[serde(rename_all = "camelCase")]
    SyncSessions {
        data: SessionStore,
        #[serde(default)]
        current_session_id: Option<SessionId>,
    },
    #[serde(rename_all = "camelCase")]
    SubmitQuestion { session_id: SessionId, text: String },
    #[serde(rename_all = "camelCase")]
    Upvote {
        session_id: SessionId,
        question_id: QuestionId,
    },
    #[serde(rename_all = "camelCase")]
    Reaction {
        session_id: SessionId,
        question_id: QuestionId,
        emoji: String,
        action: ReactionAction,
    },
    #[serde(rename_all = "camelCase")]
    Comment {
        session_id: SessionId,
        question_id: QuestionId,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    DeleteQuestion {
        session_id: SessionId,
        question_id: QuestionId,
    },
    #[serde(rename_all = "camelCase")]
    ToggleAnswered {
        session_id: SessionId,
        question_id: QuestionId,
    },
    #[serde(rename_all = "camelCase")]
    ForceSessionSwitch { session_id: SessionId },
    Ping,
    Pong,
}

impl Message {
    /// Build a snapshot message
    pub fn sync(store: &SessionStore, current: Option<&SessionId>) -> Self {
        Message::SyncSessions {
            data: store.clone(),
            current_session_id: current.cloned(),
        }
    }

    /// Wire name of the message kind
    pub fn kind(&self) -> &'static str {
        match self {
            Message::RequestSync => "request_sync",
            Message::SyncSessions { .. } => "sync_sessions",
            Message::SubmitQuestion { .. } => "submit_question",
            Message::Upvote { .. } => "upvote",
            Message::Reaction { .. } => "reaction",
            Message::Comment { .. } => "comment",
            Message::DeleteQuestion { .. } => "delete_question",
            Message::ToggleAnswered { .. } => "toggle_answered",
            Message::ForceSessionSwitch { .. } => "force_session_switch",
            Message::Ping => "ping",
            Message::Pong => "pong",
        }
    }

    /// Serialize to a JSON text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON text frame
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }
}
