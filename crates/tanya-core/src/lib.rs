//! Tanya Core Protocol Implementation
//!
//! This crate provides the data model, session store, wire protocol and state
//! mutation rules for Tanya, a live audience Q&A tool replicated over a
//! host-authoritative peer-to-peer data channel. One peer (the Host) owns the
//! truth; Clients forward mutations to it and mirror the full snapshots it
//! broadcasts back. Transports, persistence and presentation are contracts
//! implemented elsewhere.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod broadcast;
pub mod config;
pub mod directory;
pub mod errors;
pub mod mutator;
pub mod persistence;
pub mod presenter;
pub mod protocol;
pub mod role;
pub mod store;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use broadcast::{broadcast_sync, BroadcastReport};
pub use config::{
    ChannelConfig, DiscoveryConfig, LinkConfig, ReconnectConfig, ReplicationConfig, TanyaConfig,
};
pub use directory::{discovery_candidates, SessionDirectory};
pub use errors::{
    InputError, PersistenceError, ProtocolError, Result, RoleError, TanyaError, TransportError,
};
pub use mutator::{LocalOnly, Mutation, MutationHandler, Outcome, Replicated, Route, StateMutator};
pub use persistence::{KeyValueStore, MemoryKeyValueStore, SessionPersistence};
pub use presenter::{AdminFlag, AdminGate, Notice, NullPresenter, Presenter, RecordingPresenter};
pub use protocol::{JoinLink, Message, ReactionAction};
pub use role::{Role, RoleState};
pub use store::{Comment, Question, Session, SessionStore};
pub use transport::{
    ConnectionHandle, EventReceiver, EventSender, LinkState, Transport, TransportEvent,
};
pub use types::{
    CommentId, ConnectionId, IdClock, ManualTimeSource, PeerId, QuestionId, SessionId, ShortCode,
    SystemTimeSource, TimeSource, Timestamp,
};
