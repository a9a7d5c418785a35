//! In-process transport
//!
//! A [`MemoryNetwork`] acts as the signaling broker: transports register their
//! identifier when they open and dial each other by identifier. Every message
//! crosses the link as a JSON text frame, the same as on the wire. Identifiers
//! can also be registered as unresponsive, in which case dialing them never
//! completes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use tanya_core::{
    ConnectionHandle, ConnectionId, EventSender, LinkState, Message, PeerId, Transport,
    TransportError, TransportEvent,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

// ----------------------------------------------------------------------------
// Memory Network
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Registration {
    Live(EventSender),
    Unresponsive,
}

/// Shared broker connecting memory transports
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    peers: Arc<DashMap<PeerId, Registration>>,
    next_connection: Arc<AtomicU64>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that picks a random identifier when opened
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport::new(self.clone(), None)
    }

    /// A transport that registers under a fixed identifier
    pub fn transport_with_id(&self, id: impl Into<String>) -> MemoryTransport {
        MemoryTransport::new(self.clone(), Some(PeerId::new(id)))
    }

    /// Register an identifier that accepts dials but never answers them
    pub fn register_unresponsive(&self, id: impl Into<String>) {
        self.peers.insert(PeerId::new(id), Registration::Unresponsive);
    }

    pub fn is_registered(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

// ----------------------------------------------------------------------------
// Memory Transport
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Inner {
    local: Option<PeerId>,
    events: Option<EventSender>,
    links: Vec<LinkState>,
}

/// Transport endpoint on a [`MemoryNetwork`]
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    fixed_id: Option<PeerId>,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTransport {
    fn new(network: MemoryNetwork, fixed_id: Option<PeerId>) -> Self {
        Self {
            network,
            fixed_id,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Forget links that have finished closing
    fn prune_closed(&self) {
        self.lock().links.retain(LinkState::is_open);
    }

    /// Links this endpoint still tracks
    pub fn retained_links(&self) -> usize {
        self.lock().links.len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, events: EventSender) -> Result<PeerId, TransportError> {
        let id = self
            .fixed_id
            .clone()
            .unwrap_or_else(|| PeerId::new(uuid::Uuid::new_v4().to_string()));

        match self.network.peers.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(TransportError::PeerIdTaken {
                    peer_id: id.to_string(),
                })
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Registration::Live(events.clone()));
            }
        }

        let mut inner = self.lock();
        inner.local = Some(id.clone());
        inner.events = Some(events);
        info!("Memory transport open as {}", id);
        Ok(id)
    }

    async fn connect(&self, remote: &PeerId) -> Result<ConnectionHandle, TransportError> {
        let (local, events) = {
            let inner = self.lock();
            match (&inner.local, &inner.events) {
                (Some(local), Some(events)) => (local.clone(), events.clone()),
                _ => return Err(TransportError::NotOpen),
            }
        };

        let registration = self
            .network
            .peers
            .get(remote)
            .map(|entry| entry.value().clone());
        let remote_events = match registration {
            Some(Registration::Live(remote_events)) => remote_events,
            Some(Registration::Unresponsive) => {
                debug!("Dialing unresponsive peer {}", remote);
                return futures::future::pending().await;
            }
            None => {
                return Err(TransportError::PeerUnavailable {
                    peer_id: remote.to_string(),
                })
            }
        };

        let state = LinkState::new();
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();

        let local_end = ConnectionHandle::new(
            self.network.next_connection_id(),
            remote.clone(),
            state.clone(),
            local_tx,
        );
        let remote_end = ConnectionHandle::new(
            self.network.next_connection_id(),
            local.clone(),
            state.clone(),
            remote_tx,
        );

        let local_side = LinkSide {
            connection: local_end.id(),
            events,
        };
        let remote_side = LinkSide {
            connection: remote_end.id(),
            events: remote_events,
        };

        if remote_side
            .events
            .send(TransportEvent::Incoming(remote_end))
            .await
            .is_err()
        {
            return Err(TransportError::PeerUnavailable {
                peer_id: remote.to_string(),
            });
        }

        {
            let mut inner = self.lock();
            inner.links.retain(LinkState::is_open);
            inner.links.push(state.clone());
        }
        tokio::spawn(run_link(
            self.clone(),
            state,
            local_side,
            local_rx,
            remote_side,
            remote_rx,
        ));
        debug!("Memory link {} -> {} open", local, remote);
        Ok(local_end)
    }

    async fn close(&self) -> Result<(), TransportError> {
        let (local, links) = {
            let mut inner = self.lock();
            inner.events = None;
            (inner.local.take(), std::mem::take(&mut inner.links))
        };
        if let Some(local) = local {
            self.network.peers.remove(&local);
            info!("Memory transport {} closed", local);
        }
        for link in links {
            link.close();
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ----------------------------------------------------------------------------
// Link Task
// ----------------------------------------------------------------------------

struct LinkSide {
    connection: ConnectionId,
    events: EventSender,
}

/// Carry frames both ways until either end closes, then report the close to both
async fn run_link(
    owner: MemoryTransport,
    state: LinkState,
    a: LinkSide,
    mut a_out: mpsc::UnboundedReceiver<Message>,
    b: LinkSide,
    mut b_out: mpsc::UnboundedReceiver<Message>,
) {
    loop {
        tokio::select! {
            _ = state.closed() => break,
            message = a_out.recv() => match message {
                Some(message) => deliver(&b, message).await,
                None => break,
            },
            message = b_out.recv() => match message {
                Some(message) => deliver(&a, message).await,
                None => break,
            },
        }
    }

    state.close();
    owner.prune_closed();
    let _ = a.events.send(TransportEvent::Closed { connection: a.connection }).await;
    let _ = b.events.send(TransportEvent::Closed { connection: b.connection }).await;
}

async fn deliver(to: &LinkSide, message: Message) {
    let event = match message.encode() {
        Ok(frame) => match Message::decode(&frame) {
            Ok(message) => TransportEvent::Data {
                connection: to.connection,
                message,
            },
            Err(e) => TransportEvent::Undecodable {
                connection: to.connection,
                reason: e.to_string(),
            },
        },
        Err(e) => TransportEvent::Undecodable {
            connection: to.connection,
            reason: e.to_string(),
        },
    };
    let _ = to.events.send(event).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::Receiver;

    async fn open(transport: &MemoryTransport) -> (PeerId, Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let id = transport.open(tx).await.unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let network = MemoryNetwork::new();
        let host = network.transport_with_id("H1");
        let client = network.transport();
        let (host_id, mut host_events) = open(&host).await;
        let (client_id, mut client_events) = open(&client).await;
        assert_eq!(host_id, PeerId::new("H1"));

        let link = client.connect(&host_id).await.unwrap();
        assert_eq!(link.peer(), &host_id);

        let inbound = match host_events.recv().await.unwrap() {
            TransportEvent::Incoming(handle) => handle,
            other => panic!("unexpected event {:?}", other),
        };
        assert_eq!(inbound.peer(), &client_id);

        assert!(link.send(Message::RequestSync));
        match host_events.recv().await.unwrap() {
            TransportEvent::Data { connection, message } => {
                assert_eq!(connection, inbound.id());
                assert_eq!(message, Message::RequestSync);
            }
            other => panic!("unexpected event {:?}", other),
        }

        assert!(inbound.send(Message::Pong));
        match client_events.recv().await.unwrap() {
            TransportEvent::Data { message, .. } => assert_eq!(message, Message::Pong),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_reaches_both_ends() {
        let network = MemoryNetwork::new();
        let host = network.transport_with_id("H1");
        let client = network.transport();
        let (host_id, mut host_events) = open(&host).await;
        let (_, mut client_events) = open(&client).await;

        let link = client.connect(&host_id).await.unwrap();
        let _inbound = host_events.recv().await.unwrap();

        link.close();
        assert!(matches!(
            host_events.recv().await.unwrap(),
            TransportEvent::Closed { .. }
        ));
        assert!(matches!(
            client_events.recv().await.unwrap(),
            TransportEvent::Closed { connection } if connection == link.id()
        ));
        assert!(!link.send(Message::Ping));
    }

    #[tokio::test]
    async fn test_dial_failures() {
        let network = MemoryNetwork::new();
        let client = network.transport();

        assert_eq!(
            client.connect(&PeerId::new("H1")).await.unwrap_err(),
            TransportError::NotOpen
        );

        let (_, _events) = open(&client).await;
        assert!(matches!(
            client.connect(&PeerId::new("nobody")).await,
            Err(TransportError::PeerUnavailable { .. })
        ));

        network.register_unresponsive("ghost");
        let dial = tokio::time::timeout(
            Duration::from_millis(50),
            client.connect(&PeerId::new("ghost")),
        )
        .await;
        assert!(dial.is_err());
    }

    #[tokio::test]
    async fn test_identifier_is_exclusive() {
        let network = MemoryNetwork::new();
        let first = network.transport_with_id("H1");
        let second = network.transport_with_id("H1");
        let (_, _events) = open(&first).await;

        let (tx, _rx) = mpsc::channel(4);
        assert!(matches!(
            second.open(tx).await,
            Err(TransportError::PeerIdTaken { .. })
        ));

        first.close().await.unwrap();
        assert!(!network.is_registered(&PeerId::new("H1")));
    }

    #[tokio::test]
    async fn test_closed_links_are_not_retained() {
        let network = MemoryNetwork::new();
        let host = network.transport_with_id("H1");
        let client = network.transport();
        let (host_id, mut host_events) = open(&host).await;
        let (_, mut client_events) = open(&client).await;

        for round in 1..=5 {
            let link = client.connect(&host_id).await.unwrap();
            assert_eq!(client.retained_links(), 1, "round {}", round);
            let _inbound = host_events.recv().await.unwrap();

            link.close();
            assert!(matches!(
                client_events.recv().await.unwrap(),
                TransportEvent::Closed { connection } if connection == link.id()
            ));
            assert!(matches!(
                host_events.recv().await.unwrap(),
                TransportEvent::Closed { .. }
            ));
        }

        assert_eq!(client.retained_links(), 0);
        assert_eq!(host.retained_links(), 0);
    }
}
