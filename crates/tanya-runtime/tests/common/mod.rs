//! Shared helpers for runtime integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tanya_core::{
    AdminFlag, ConnectionHandle, Message, Notice, PeerId, RecordingPresenter, SessionId,
    SessionStore, TanyaConfig, Transport, TransportEvent,
};
use tanya_runtime::{
    MemoryNetwork, MemoryTransport, RuntimeBuilder, RuntimeHandle, RuntimeStatus,
};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

const POLL: Duration = Duration::from_millis(10);
const POLLS: usize = 300;

/// A running runtime with its recording presenter
pub struct Peer {
    pub handle: RuntimeHandle,
    pub presenter: RecordingPresenter,
}

/// Builder with test configuration and an admin user
pub fn builder(transport: MemoryTransport) -> RuntimeBuilder {
    RuntimeBuilder::new(Arc::new(transport))
        .with_config(TanyaConfig::testing())
        .with_admin_gate(Arc::new(AdminFlag::new(true)))
        .with_seed(7)
}

pub async fn start(builder: RuntimeBuilder) -> Peer {
    let presenter = RecordingPresenter::new();
    let handle = builder
        .with_presenter(Arc::new(presenter.clone()))
        .build_and_start()
        .await
        .expect("runtime starts");
    // The first intent is answered only after the transport has opened
    handle.status().await.expect("runtime answers");
    Peer { handle, presenter }
}

pub async fn start_host(network: &MemoryNetwork, id: &str) -> Peer {
    start(builder(network.transport_with_id(id))).await
}

pub async fn wait_for_status(
    handle: &RuntimeHandle,
    ready: impl Fn(&RuntimeStatus) -> bool,
) -> RuntimeStatus {
    for _ in 0..POLLS {
        let status = handle.status().await.expect("status");
        if ready(&status) {
            return status;
        }
        sleep(POLL).await;
    }
    panic!("status never became ready");
}

pub async fn wait_for_snapshot(
    handle: &RuntimeHandle,
    ready: impl Fn(&SessionStore, Option<&SessionId>) -> bool,
) -> (SessionStore, Option<SessionId>) {
    for _ in 0..POLLS {
        let (store, active) = handle.snapshot().await.expect("snapshot");
        if ready(&store, active.as_ref()) {
            return (store, active);
        }
        sleep(POLL).await;
    }
    panic!("snapshot never became ready");
}

pub async fn wait_for_notice(presenter: &RecordingPresenter, wanted: impl Fn(&Notice) -> bool) {
    for _ in 0..POLLS {
        if presenter.notices().iter().any(&wanted) {
            return;
        }
        sleep(POLL).await;
    }
    panic!("notice never arrived: {:?}", presenter.notices());
}

// ----------------------------------------------------------------------------
// Raw Peers
// ----------------------------------------------------------------------------

/// A bare transport endpoint that speaks the protocol by hand
pub struct RawPeer {
    pub transport: MemoryTransport,
    pub events: mpsc::Receiver<TransportEvent>,
    pub link: ConnectionHandle,
}

impl RawPeer {
    /// Dial `host` and consume the snapshot it sends on connect
    pub async fn connect(network: &MemoryNetwork, host: &str) -> (Self, SessionStore) {
        let transport = network.transport();
        let (tx, events) = mpsc::channel(64);
        transport.open(tx).await.expect("raw transport opens");
        let link = transport
            .connect(&PeerId::new(host))
            .await
            .expect("raw peer connects");
        let mut peer = Self {
            transport,
            events,
            link,
        };
        let initial = peer.next_sync().await;
        (peer, initial)
    }

    pub fn send(&self, message: Message) {
        assert!(self.link.send(message), "raw link is open");
    }

    /// Next decoded message, skipping lifecycle events
    pub async fn next_message(&mut self) -> Message {
        loop {
            let event = timeout(Duration::from_secs(5), self.events.recv())
                .await
                .expect("message within timeout")
                .expect("event channel open");
            if let TransportEvent::Data { message, .. } = event {
                return message;
            }
        }
    }

    /// Next snapshot, skipping anything else
    pub async fn next_sync(&mut self) -> SessionStore {
        loop {
            if let Message::SyncSessions { data, .. } = self.next_message().await {
                return data;
            }
        }
    }

    /// Proves nothing is queued ahead of a pong
    pub async fn assert_quiet(&mut self) {
        self.send(Message::Ping);
        assert_eq!(self.next_message().await, Message::Pong);
    }
}
