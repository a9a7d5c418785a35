//! Replication loop
//!
//! [`ReplicationTask`] is the single task that touches the replication state.
//! It selects over transport events, intents, the keep-alive and expiry timers
//! and the results of background work. Dialing, discovery and reconnect
//! backoff run in spawned tasks so the loop never waits on the network.

use std::sync::Arc;

use tanya_core::{
    ConnectionHandle, EventReceiver, EventSender, Notice, PeerId, Result, RoleError, SessionId,
    ShortCode, Transport, TransportEvent,
};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::handlers::JoinPlan;
use super::state::ReplicationContext;
use crate::backoff::Backoff;
use crate::discovery::Discovery;
use crate::intent::{Intent, IntentOutcome, IntentReceiver, IntentRequest};

// ----------------------------------------------------------------------------
// Launch Mode
// ----------------------------------------------------------------------------

/// How the process takes its role once the transport opens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// Accept inbound links as the Host
    Host,
    /// Dial this Host and become its Client
    Client(PeerId),
    /// Stay Unconnected and join whichever Host serves this code
    JoinCode(String),
}

/// Results reported back to the loop by spawned work
#[derive(Debug)]
enum BackgroundEvent {
    Connected {
        host: PeerId,
        connection: ConnectionHandle,
    },
    ConnectFailed {
        host: PeerId,
        reason: String,
    },
    Joined {
        host: PeerId,
        connection: ConnectionHandle,
    },
    JoinFailed {
        code: ShortCode,
    },
    Reconnecting {
        host: PeerId,
        attempt: u32,
    },
    Reconnected {
        connection: ConnectionHandle,
    },
    ReconnectFailed {
        host: PeerId,
    },
}

// ----------------------------------------------------------------------------
// Replication Task
// ----------------------------------------------------------------------------

/// The replication loop and everything it owns
pub struct ReplicationTask {
    context: ReplicationContext,
    transport: Arc<dyn Transport>,
    launch: Launch,
    launch_session: Option<SessionId>,
    event_sender: EventSender,
    event_receiver: EventReceiver,
    intent_receiver: IntentReceiver,
    background_sender: mpsc::UnboundedSender<BackgroundEvent>,
    background_receiver: mpsc::UnboundedReceiver<BackgroundEvent>,
    join_in_flight: bool,
    running: bool,
}

impl ReplicationTask {
    pub fn new(
        context: ReplicationContext,
        transport: Arc<dyn Transport>,
        launch: Launch,
        launch_session: Option<SessionId>,
        intent_receiver: IntentReceiver,
    ) -> Self {
        let (event_sender, event_receiver) =
            mpsc::channel(context.config.channels.event_buffer_size);
        let (background_sender, background_receiver) = mpsc::unbounded_channel();
        Self {
            context,
            transport,
            launch,
            launch_session,
            event_sender,
            event_receiver,
            intent_receiver,
            background_sender,
            background_receiver,
            join_in_flight: false,
            running: true,
        }
    }

    /// Run until a shutdown intent arrives or every intent sender is dropped
    pub async fn run(mut self) -> Result<()> {
        info!("Replication task starting with {} transport", self.transport.name());
        self.start().await;

        let keepalive_period = self.context.config.replication.keepalive_interval();
        let mut keepalive = interval_at(Instant::now() + keepalive_period, keepalive_period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let expiry_period = self.context.config.replication.expiry_check_interval();
        let mut expiry = interval_at(Instant::now() + expiry_period, expiry_period);
        expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running {
            tokio::select! {
                event = self.event_receiver.recv() => {
                    if let Some(event) = event {
                        self.process_event(event);
                    }
                }

                request = self.intent_receiver.recv() => {
                    match request {
                        Some(request) => self.process_intent(request),
                        None => {
                            info!("Intent channel closed, shutting down");
                            self.running = false;
                        }
                    }
                }

                _ = keepalive.tick() => self.context.keepalive(),

                _ = expiry.tick() => self.context.check_expiry(),

                Some(event) = self.background_receiver.recv() => {
                    self.process_background(event);
                }
            }
        }

        self.context.connections.close_all();
        if let Err(e) = self.transport.close().await {
            error!("Failed to close transport: {}", e);
        }
        info!("Replication task stopped");
        Ok(())
    }

    /// Open the transport and take the launch role
    async fn start(&mut self) {
        self.context.set_active(self.launch_session.clone());

        let local = match self.transport.open(self.event_sender.clone()).await {
            Ok(local) => local,
            Err(e) => {
                error!("Transport {} failed to open: {}", self.transport.name(), e);
                self.context.notify(Notice::Offline {
                    reason: e.to_string(),
                });
                self.context.bootstrap();
                return;
            }
        };

        match self.launch.clone() {
            Launch::Host => {
                self.context.bootstrap();
                self.context.become_host(local);
            }
            Launch::Client(host) => {
                self.context.set_local_peer(local);
                self.context.render();
                self.spawn_connect(host);
            }
            Launch::JoinCode(code) => {
                self.context.set_local_peer(local);
                self.context.bootstrap();
                if let Err(e) = self.start_join(&code) {
                    warn!("Join by code {} failed to start: {}", code, e);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Event Processing
    // ------------------------------------------------------------------------

    fn process_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Incoming(connection) => self.context.on_incoming(connection),
            TransportEvent::Data {
                connection,
                message,
            } => self.context.on_message(connection, message),
            TransportEvent::Undecodable { connection, reason } => {
                self.context.on_undecodable(connection, &reason)
            }
            TransportEvent::Closed { connection } => {
                if let Some(host) = self.context.on_closed(connection) {
                    if self.context.config.reconnect.is_enabled() {
                        self.spawn_reconnect(host);
                    }
                }
            }
            TransportEvent::Error(e) => error!("Transport error: {}", e),
        }
    }

    fn process_intent(&mut self, request: IntentRequest) {
        let IntentRequest { intent, reply } = request;
        debug!("Processing {} intent", intent.kind());

        let result = match intent {
            Intent::Shutdown => {
                self.running = false;
                Ok(IntentOutcome::Stopped)
            }
            Intent::JoinByCode { code } => self.start_join(&code),
            other => self.context.handle_intent(other),
        };

        if let Err(e) = &result {
            if e.is_user_facing() {
                debug!("Intent rejected: {}", e);
            } else {
                error!("Intent failed: {}", e);
            }
        }
        let _ = reply.send(result);
    }

    fn process_background(&mut self, event: BackgroundEvent) {
        match event {
            BackgroundEvent::Connected { host, connection } => {
                if let Err(e) = self.context.become_client(host, connection) {
                    warn!("Cannot become client: {}", e);
                }
            }
            BackgroundEvent::ConnectFailed { host, reason } => {
                error!("Failed to connect to host {}: {}", host, reason);
                self.context.notify(Notice::ConnectionFailed { host, reason });
                self.context.bootstrap();
            }
            BackgroundEvent::Joined { host, connection } => {
                self.join_in_flight = false;
                if let Err(e) = self.context.become_client(host, connection) {
                    warn!("Cannot join host: {}", e);
                    self.context.joining = None;
                }
            }
            BackgroundEvent::JoinFailed { code } => {
                self.join_in_flight = false;
                self.context.joining = None;
                warn!("No host found for session code {}", code);
                self.context.notify(Notice::SessionNotFound { code });
            }
            BackgroundEvent::Reconnecting { host, attempt } => {
                info!("Reconnecting to {} (attempt {})", host, attempt);
                self.context.notify(Notice::Reconnecting { host, attempt });
            }
            BackgroundEvent::Reconnected { connection } => {
                self.context.attach_host_link(connection);
            }
            BackgroundEvent::ReconnectFailed { host } => {
                warn!("Giving up reconnecting to {}", host);
                self.context.notify(Notice::ConnectionFailed {
                    host,
                    reason: "reconnect attempts exhausted".to_string(),
                });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Background Work
    // ------------------------------------------------------------------------

    fn start_join(&mut self, code: &str) -> Result<IntentOutcome> {
        if self.join_in_flight {
            return Err(self.context.reject(RoleError::JoinInProgress.into()));
        }

        match self.context.prepare_join(code)? {
            JoinPlan::Local(session) => Ok(IntentOutcome::Switched(session)),
            JoinPlan::Discover { code, candidates } => {
                info!(
                    "Looking for session {} across {} candidates",
                    code,
                    candidates.len()
                );
                self.join_in_flight = true;
                let discovery = Discovery::new(
                    self.transport.clone(),
                    self.context.config.discovery.clone(),
                );
                let sender = self.background_sender.clone();
                tokio::spawn(async move {
                    let event = match discovery.find_host(&candidates).await {
                        Some((host, connection)) => BackgroundEvent::Joined { host, connection },
                        None => BackgroundEvent::JoinFailed { code },
                    };
                    let _ = sender.send(event);
                });
                Ok(IntentOutcome::JoinStarted)
            }
        }
    }

    fn spawn_connect(&self, host: PeerId) {
        let transport = self.transport.clone();
        let sender = self.background_sender.clone();
        tokio::spawn(async move {
            debug!("Connecting to host {}", host);
            let event = match transport.connect(&host).await {
                Ok(connection) => BackgroundEvent::Connected { host, connection },
                Err(e) => BackgroundEvent::ConnectFailed {
                    host,
                    reason: e.to_string(),
                },
            };
            let _ = sender.send(event);
        });
    }

    fn spawn_reconnect(&self, host: PeerId) {
        let transport = self.transport.clone();
        let sender = self.background_sender.clone();
        let mut backoff = Backoff::new(&self.context.config.reconnect);
        tokio::spawn(async move {
            while !backoff.is_exhausted() {
                let delay = backoff.next();
                let _ = sender.send(BackgroundEvent::Reconnecting {
                    host: host.clone(),
                    attempt: backoff.attempt(),
                });
                sleep(delay).await;
                match transport.connect(&host).await {
                    Ok(connection) => {
                        let _ = sender.send(BackgroundEvent::Reconnected { connection });
                        return;
                    }
                    Err(e) => debug!("Reconnect to {} failed: {}", host, e),
                }
            }
            let _ = sender.send(BackgroundEvent::ReconnectFailed { host });
        });
    }
}

impl std::fmt::Debug for ReplicationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationTask")
            .field("context", &self.context)
            .field("transport", &self.transport.name())
            .field("launch", &self.launch)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}
