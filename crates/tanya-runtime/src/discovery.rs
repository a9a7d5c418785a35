//! Best-effort host discovery for join-by-code
//!
//! Candidates are dialed one at a time. Each dial gets a fixed timeout; a dial
//! that fails outright is followed by a short pause before the next candidate.
//! Dropping a timed-out dial abandons that link.

use std::sync::Arc;

use tanya_core::{ConnectionHandle, DiscoveryConfig, PeerId, Transport};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

/// Dials candidate identifiers until one answers
#[derive(Clone)]
pub struct Discovery {
    transport: Arc<dyn Transport>,
    config: DiscoveryConfig,
}

impl Discovery {
    pub fn new(transport: Arc<dyn Transport>, config: DiscoveryConfig) -> Self {
        Self { transport, config }
    }

    /// First candidate that opens a link, or None once all are exhausted
    pub async fn find_host(&self, candidates: &[PeerId]) -> Option<(PeerId, ConnectionHandle)> {
        for candidate in candidates {
            debug!("Trying to connect to {}", candidate);
            match timeout(self.config.candidate_timeout(), self.transport.connect(candidate)).await {
                Ok(Ok(connection)) => {
                    info!("Discovered host {}", candidate);
                    return Some((candidate.clone(), connection));
                }
                Ok(Err(e)) => {
                    debug!("Candidate {} failed: {}", candidate, e);
                    sleep(self.config.retry_pause()).await;
                }
                Err(_) => {
                    debug!(
                        "Candidate {} timed out after {:?}",
                        candidate,
                        self.config.candidate_timeout()
                    );
                }
            }
        }
        None
    }
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("transport", &self.transport.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryNetwork;
    use std::time::Duration;
    use tanya_core::{discovery_candidates, ShortCode, TransportEvent};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    async fn dialer(network: &MemoryNetwork) -> (Discovery, mpsc::Receiver<TransportEvent>) {
        let client = network.transport();
        let (tx, rx) = mpsc::channel(8);
        client.open(tx).await.unwrap();
        (Discovery::new(Arc::new(client), DiscoveryConfig::default()), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_unresponsive_and_missing_candidates() {
        let network = MemoryNetwork::new();
        network.register_unresponsive("host-abc123");
        let host = network.transport_with_id("qa-abc123");
        let (host_tx, mut host_events) = mpsc::channel(8);
        host.open(host_tx).await.unwrap();

        let (discovery, _events) = dialer(&network).await;
        let candidates = discovery_candidates(&ShortCode::normalize("abc123").unwrap());

        let start = Instant::now();
        let (found, _link) = discovery.find_host(&candidates).await.unwrap();
        let elapsed = start.elapsed();

        // host-* times out, session-* fails outright, qa-* answers
        assert_eq!(found, PeerId::new("qa-abc123"));
        assert!(elapsed >= Duration::from_millis(3_500));
        assert!(elapsed < Duration::from_millis(4_000));
        assert!(matches!(
            host_events.recv().await,
            Some(TransportEvent::Incoming(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_none() {
        let network = MemoryNetwork::new();
        let (discovery, _events) = dialer(&network).await;
        let candidates = discovery_candidates(&ShortCode::normalize("zz9999").unwrap());

        let start = Instant::now();
        assert!(discovery.find_host(&candidates).await.is_none());
        let pauses = Duration::from_millis(500) * candidates.len() as u32;
        assert!(start.elapsed() >= pauses);
        assert!(start.elapsed() < pauses + Duration::from_millis(100));
    }
}
