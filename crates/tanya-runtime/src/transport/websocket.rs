//! WebSocket transport
//!
//! A Host listens on a TCP address and its identifier is the `ws://` URL of
//! that listener; Clients dial the URL directly. Each message is one JSON text
//! frame. Close frames, stream end and read errors all surface as a close of
//! the link.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tanya_core::{
    ConnectionHandle, ConnectionId, EventSender, LinkState, Message, PeerId, Transport,
    TransportError, TransportEvent,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as Frame;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// Pause after a failed accept, e.g. when file descriptors run out
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Inner {
    local: Option<PeerId>,
    events: Option<EventSender>,
    accept_task: Option<JoinHandle<()>>,
    links: Vec<LinkState>,
}

/// Transport over WebSocket links
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    listen: Option<SocketAddr>,
    inner: Arc<Mutex<Inner>>,
    next_connection: Arc<AtomicU64>,
}

impl WebSocketTransport {
    /// Transport that accepts inbound links on `addr`
    pub fn listening(addr: SocketAddr) -> Self {
        Self::new(Some(addr))
    }

    /// Transport that only dials out
    pub fn dial_only() -> Self {
        Self::new(None)
    }

    fn new(listen: Option<SocketAddr>) -> Self {
        Self {
            listen,
            inner: Arc::new(Mutex::new(Inner::default())),
            next_connection: Arc::new(AtomicU64::new(0)),
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

    fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Start the reader and writer tasks for an established socket
    fn spawn_link<S>(&self, socket: WebSocketStream<S>, peer: PeerId, events: EventSender) -> ConnectionHandle
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let state = LinkState::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(self.next_connection_id(), peer, state.clone(), outbound_tx);

        {
            let mut inner = self.lock();
            inner.links.retain(LinkState::is_open);
            inner.links.push(state.clone());
        }
        tokio::spawn(run_socket(self.clone(), socket, handle.id(), state, outbound_rx, events));
        handle
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, events: EventSender) -> Result<PeerId, TransportError> {
        let local = match self.listen {
            Some(addr) => {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|e| TransportError::OpenFailed {
                        reason: format!("bind {}: {}", addr, e),
                    })?;
                let bound = listener.local_addr().map_err(|e| TransportError::OpenFailed {
                    reason: e.to_string(),
                })?;
                let local = PeerId::new(format!("ws://{}", bound));

                let transport = self.clone();
                let accept_events = events.clone();
                let task = tokio::spawn(async move {
                    transport.accept_loop(listener, accept_events).await;
                });
                self.lock().accept_task = Some(task);
                info!("WebSocket transport listening on {}", local);
                local
            }
            None => PeerId::new(format!("ws-client-{}", uuid::Uuid::new_v4())),
        };

        let mut inner = self.lock();
        inner.local = Some(local.clone());
        inner.events = Some(events);
        Ok(local)
    }

    async fn connect(&self, remote: &PeerId) -> Result<ConnectionHandle, TransportError> {
        let events = self.lock().events.clone().ok_or(TransportError::NotOpen)?;

        let url = url::Url::parse(remote.as_str()).map_err(|e| TransportError::InvalidPeerId {
            peer_id: remote.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidPeerId {
                peer_id: remote.to_string(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                peer_id: remote.to_string(),
                reason: e.to_string(),
            })?;

        debug!("WebSocket link to {} open", remote);
        Ok(self.spawn_link(socket, remote.clone(), events))
    }

    async fn close(&self) -> Result<(), TransportError> {
        let (accept_task, links) = {
            let mut inner = self.lock();
            inner.events = None;
            inner.local = None;
            (inner.accept_task.take(), std::mem::take(&mut inner.links))
        };
        if let Some(task) = accept_task {
            task.abort();
        }
        for link in links {
            link.close();
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

impl WebSocketTransport {
    async fn accept_loop(&self, listener: TcpListener, events: EventSender) {
        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };

            let transport = self.clone();
            let events = events.clone();
            tokio::spawn(async move {
                match tokio_tungstenite::accept_async(stream).await {
                    Ok(socket) => {
                        let peer = PeerId::new(format!("ws://{}", remote));
                        let handle = transport.spawn_link(socket, peer, events.clone());
                        if events.send(TransportEvent::Incoming(handle.clone())).await.is_err() {
                            handle.close();
                        }
                    }
                    Err(e) => warn!("WebSocket handshake with {} failed: {}", remote, e),
                }
            });
        }
    }
}

/// Pump frames between the socket and the link until either side closes
async fn run_socket<S>(
    owner: WebSocketTransport,
    socket: WebSocketStream<S>,
    connection: ConnectionId,
    state: LinkState,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: EventSender,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = socket.split();

    let writer_state = state.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_state.closed() => break,
                message = outbound.recv() => {
                    let Some(message) = message else { break };
                    let frame = match message.encode() {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("Failed to encode {}: {}", message.kind(), e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Frame::Text(frame)).await {
                        warn!("WebSocket write error on {}: {}", connection, e);
                        break;
                    }
                }
            }
        }
        let _ = write.send(Frame::Close(None)).await;
    });

    loop {
        tokio::select! {
            _ = state.closed() => break,
            frame = read.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        warn!("WebSocket read error on {}: {}", connection, e);
                        break;
                    }
                    None => break,
                };
                match frame {
                    Frame::Text(text) => {
                        let event = match Message::decode(&text) {
                            Ok(message) => TransportEvent::Data { connection, message },
                            Err(e) => TransportEvent::Undecodable {
                                connection,
                                reason: e.to_string(),
                            },
                        };
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Frame::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    state.close();
    let _ = writer.await;
    owner.prune_closed();
    let _ = events.send(TransportEvent::Closed { connection }).await;
}
