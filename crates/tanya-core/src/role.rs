//! Role state
//!
//! A process is exactly one of Host, Client or Unconnected. The role is fixed
//! once the transport (and, for a Client, the Host link) opens and is never
//! switched afterwards.

use core::fmt;

use crate::errors::RoleError;
use crate::types::PeerId;

/// Replication role of this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Source of truth, accepts inbound links
    Host,
    /// Relays mutations to a Host and mirrors its snapshots
    Client,
    /// No live links; behaves as an authoritative Host of one
    Unconnected,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Client => "client",
            Role::Unconnected => "unconnected",
        }
    }

    /// Whether this role applies mutations to its own store
    pub fn is_authoritative(&self) -> bool {
        !matches!(self, Role::Client)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role plus the identities learned while assigning it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleState {
    role: Role,
    local: Option<PeerId>,
    host: Option<PeerId>,
}

impl Default for RoleState {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleState {
    pub fn new() -> Self {
        Self {
            role: Role::Unconnected,
            local: None,
            host: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn is_client(&self) -> bool {
        self.role == Role::Client
    }

    /// Our own transport identity, once known
    pub fn local_peer(&self) -> Option<&PeerId> {
        self.local.as_ref()
    }

    /// The Host identity: ourselves when hosting, the remote when a Client
    pub fn host_peer(&self) -> Option<&PeerId> {
        match self.role {
            Role::Host => self.local.as_ref(),
            Role::Client => self.host.as_ref(),
            Role::Unconnected => None,
        }
    }

    pub fn set_local_peer(&mut self, peer: PeerId) {
        self.local = Some(peer);
    }

    /// Become Host; only valid once, from Unconnected
    pub fn assign_host(&mut self, local: PeerId) -> Result<(), RoleError> {
        self.ensure_unassigned()?;
        self.role = Role::Host;
        self.local = Some(local);
        Ok(())
    }

    /// Become Client of `host`; only valid once, from Unconnected
    pub fn assign_client(&mut self, host: PeerId) -> Result<(), RoleError> {
        self.ensure_unassigned()?;
        self.role = Role::Client;
        self.host = Some(host);
        Ok(())
    }

    /// Join-by-code is only allowed while Unconnected
    pub fn ensure_can_join(&self) -> Result<(), RoleError> {
        match self.role {
            Role::Unconnected => Ok(()),
            Role::Host => Err(RoleError::AlreadyHost),
            Role::Client => Err(RoleError::AlreadyConnected),
        }
    }

    fn ensure_unassigned(&self) -> Result<(), RoleError> {
        match self.role {
            Role::Unconnected => Ok(()),
            other => Err(RoleError::AlreadyAssigned {
                current: other.as_str(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_is_exclusive() {
        let mut state = RoleState::new();
        assert!(state.role().is_authoritative());
        assert!(state.ensure_can_join().is_ok());

        state.assign_host(PeerId::new("H1")).unwrap();
        assert!(state.is_host());
        assert_eq!(state.host_peer(), Some(&PeerId::new("H1")));
        assert_eq!(
            state.assign_client(PeerId::new("H2")),
            Err(RoleError::AlreadyAssigned { current: "host" })
        );
        assert_eq!(state.ensure_can_join(), Err(RoleError::AlreadyHost));
        assert!(!state.is_client());
    }

    #[test]
    fn test_client_assignment() {
        let mut state = RoleState::new();
        state.set_local_peer(PeerId::new("C1"));
        state.assign_client(PeerId::new("H1")).unwrap();

        assert!(!state.role().is_authoritative());
        assert_eq!(state.local_peer(), Some(&PeerId::new("C1")));
        assert_eq!(state.host_peer(), Some(&PeerId::new("H1")));
        assert_eq!(state.ensure_can_join(), Err(RoleError::AlreadyConnected));
        assert!(state.assign_host(PeerId::new("C1")).is_err());
    }
}
