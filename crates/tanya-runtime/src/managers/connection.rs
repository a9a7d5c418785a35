//! Connection bookkeeping for the replication runtime
//!
//! The ConnectionManager only observes links: the transport owns their
//! lifecycle, and the manager adds them on open and drops them on close. A
//! Host holds any number of inbound links; a Client holds a single link to its
//! Host.

use std::collections::BTreeMap;

use tanya_core::{ConnectionHandle, ConnectionId};
use tracing::info;

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

/// Tracks the live links of this process
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// Inbound links accepted while hosting
    inbound: BTreeMap<ConnectionId, ConnectionHandle>,
    /// Outbound link to our Host
    host_link: Option<ConnectionHandle>,
    /// Statistics
    stats: ConnectionStats,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an accepted inbound link
    pub fn add_inbound(&mut self, connection: ConnectionHandle) {
        info!(
            "Client {} connected on {}",
            connection.peer(),
            connection.id()
        );
        self.stats.accepted += 1;
        self.inbound.insert(connection.id(), connection);
    }

    /// Track the link to our Host, replacing any previous one
    pub fn set_host_link(&mut self, connection: ConnectionHandle) {
        info!("Connected to host {} on {}", connection.peer(), connection.id());
        self.stats.dialed += 1;
        if let Some(previous) = self.host_link.replace(connection) {
            previous.close();
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionHandle> {
        match &self.host_link {
            Some(link) if link.id() == id => Some(link),
            _ => self.inbound.get(&id),
        }
    }

    pub fn host_link(&self) -> Option<&ConnectionHandle> {
        self.host_link.as_ref()
    }

    pub fn is_host_link_open(&self) -> bool {
        self.host_link.as_ref().is_some_and(|c| c.is_open())
    }

    pub fn is_host_link(&self, id: ConnectionId) -> bool {
        self.host_link.as_ref().is_some_and(|c| c.id() == id)
    }

    /// Inbound links in acceptance order
    pub fn inbound(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.inbound.values()
    }

    /// Inbound links other than `except`
    pub fn inbound_except(&self, except: ConnectionId) -> impl Iterator<Item = &ConnectionHandle> {
        self.inbound.values().filter(move |c| c.id() != except)
    }

    pub fn inbound_count(&self) -> usize {
        self.inbound.len()
    }

    /// Links currently reporting open, inbound and outbound
    pub fn open_count(&self) -> usize {
        self.inbound.values().filter(|c| c.is_open()).count() + usize::from(self.is_host_link_open())
    }

    /// Forget a closed link; returns the removed handle
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionHandle> {
        let removed = if self.is_host_link(id) {
            self.host_link.take()
        } else {
            self.inbound.remove(&id)
        };
        if let Some(connection) = &removed {
            self.stats.removed += 1;
            info!("Connection {} to {} closed", id, connection.peer());
        }
        removed
    }

    /// Close every link
    pub fn close_all(&mut self) {
        for connection in self.inbound.values() {
            connection.close();
        }
        if let Some(link) = &self.host_link {
            link.close();
        }
    }

    pub fn get_statistics(&self) -> &ConnectionStats {
        &self.stats
    }
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Statistics for connection management
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Inbound links accepted
    pub accepted: u64,
    /// Outbound links established
    pub dialed: u64,
    /// Links removed after closing
    pub removed: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
