//! Transport abstraction for the Tanya replication protocol
//!
//! A transport wraps a peer-to-peer connection primitive. It reports its own
//! identity once open, accepts inbound links, dials outbound links and
//! surfaces data and close events on a single event channel. The replication
//! logic only ever sees [`ConnectionHandle`]s and [`TransportEvent`]s.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::trace;

use crate::errors::TransportError;
use crate::protocol::Message;
use crate::types::{ConnectionId, PeerId};

// ----------------------------------------------------------------------------
// Link State
// ----------------------------------------------------------------------------

/// Open/closed flag shared by both ends of a link and the tasks serving it
#[derive(Debug, Clone)]
pub struct LinkState {
    open: Arc<watch::Sender<bool>>,
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkState {
    /// A new, open link
    pub fn new() -> Self {
        let (open, _) = watch::channel(true);
        Self {
            open: Arc::new(open),
        }
    }

    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Mark the link closed; returns false if it already was
    pub fn close(&self) -> bool {
        self.open.send_replace(false)
    }

    /// Resolves once the link is closed
    pub async fn closed(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| !*open).await;
    }
}

// ----------------------------------------------------------------------------
// Connection Handle
// ----------------------------------------------------------------------------

/// Handle to one open (or formerly open) peer link
///
/// Cloning shares the underlying link. Sends never block; the transport's
/// writer task drains the queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: PeerId,
    state: LinkState,
    outbound: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        peer: PeerId,
        state: LinkState,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            id,
            peer,
            state,
            outbound,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Identity of the remote peer
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open() && !self.outbound.is_closed()
    }

    /// Queue a message; silently dropped when the link is not open
    pub fn send(&self, message: Message) -> bool {
        if !self.is_open() {
            trace!("Dropping {} on closed connection {}", message.kind(), self.id);
            return false;
        }
        self.outbound.send(message).is_ok()
    }

    /// Mark the link closed; the transport tears it down and reports the close
    pub fn close(&self) {
        self.state.close();
    }

    /// Shared open/closed state of the link
    pub fn state(&self) -> &LinkState {
        &self.state
    }
}

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Events a transport pushes to the replication loop
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A remote peer opened a link to us
    Incoming(ConnectionHandle),
    /// A message arrived on a link
    Data {
        connection: ConnectionId,
        message: Message,
    },
    /// A frame arrived that could not be decoded
    Undecodable {
        connection: ConnectionId,
        reason: String,
    },
    /// A link closed, from either side
    Closed { connection: ConnectionId },
    /// A transport-level failure not tied to a single link
    Error(TransportError),
}

pub type EventSender = mpsc::Sender<TransportEvent>;
pub type EventReceiver = mpsc::Receiver<TransportEvent>;

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Unified transport interface used by the replication runtime
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the transport and learn our own identity
    ///
    /// All subsequent events, for inbound and outbound links alike, are pushed
    /// to `events`.
    async fn open(&self, events: EventSender) -> Result<PeerId, TransportError>;

    /// Dial a remote peer; resolves once the link is open
    async fn connect(&self, remote: &PeerId) -> Result<ConnectionHandle, TransportError>;

    /// Close every link and stop accepting new ones
    async fn close(&self) -> Result<(), TransportError>;

    /// Human readable transport name for logs
    fn name(&self) -> &'static str;
}
