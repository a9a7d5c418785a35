//! Full-state broadcast
//!
//! After every host-side mutation the whole store goes out to every open
//! connection as one `sync_sessions` message. There are no deltas and nothing
//! is queued for links that are not open.

use tracing::debug;

use crate::protocol::Message;
use crate::role::Role;
use crate::store::SessionStore;
use crate::transport::ConnectionHandle;
use crate::types::SessionId;

/// How many connections a broadcast reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub skipped: usize,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.skipped
    }
}

/// Push a snapshot to every open connection; a no-op unless `role` is Host
pub fn broadcast_sync<'a>(
    role: Role,
    connections: impl IntoIterator<Item = &'a ConnectionHandle>,
    store: &SessionStore,
    current: Option<&SessionId>,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    if role != Role::Host {
        return report;
    }

    let snapshot = Message::sync(store, current);
    for connection in connections {
        if connection.send(snapshot.clone()) {
            report.delivered += 1;
        } else {
            report.skipped += 1;
        }
    }

    debug!(
        "Broadcast {} sessions to {} connections ({} skipped)",
        store.len(),
        report.delivered,
        report.skipped
    );
    report
}
