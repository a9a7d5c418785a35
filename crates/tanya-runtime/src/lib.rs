//! Tanya Runtime Engine
//!
//! This crate contains the runtime engine for the Tanya replication protocol:
//! - `ReplicationTask`: the single event loop that owns all replication state
//! - `ReplicationContext`: role, links, store and protocol handlers
//! - Connection bookkeeping, join-by-code discovery and reconnect backoff
//! - In-memory and WebSocket transport adapters
//!
//! `tanya-core` defines the data model and contracts; this crate drives them.

pub mod backoff;
pub mod builder;
pub mod discovery;
pub mod intent;
pub mod logic;
pub mod managers;
pub mod transport;

pub use backoff::Backoff;
pub use builder::{submit, RuntimeBuilder, RuntimeHandle};
pub use discovery::Discovery;
pub use intent::{Intent, IntentOutcome, IntentRequest, IntentSender, RuntimeStatus};
pub use logic::{Collaborators, JoinPlan, Launch, ReplicationContext, ReplicationTask};
pub use managers::*;
pub use transport::{MemoryNetwork, MemoryTransport, WebSocketTransport};

// Re-export core types for convenience
pub use tanya_core::{
    AdminFlag, JoinLink, Notice, PeerId, QuestionId, RecordingPresenter, Role, SessionId,
    SessionStore, TanyaConfig, TanyaError,
};
