//! Protocol and intent handlers
//!
//! Host handlers verify references, apply, persist, render and broadcast.
//! Client handlers only mirror what the Host sends. Intent handlers validate
//! and gate first, then either forward to the Host or apply locally depending
//! on the mutation handler's route.

use tanya_core::{
    discovery_candidates, ConnectionHandle, ConnectionId, InputError, Message, Mutation, Notice,
    Outcome, PeerId, QuestionId, ReactionAction, Result, RoleError, Route, SessionId, ShortCode, TanyaError,
};
use tracing::{debug, error, info, warn};

use super::state::ReplicationContext;
use crate::intent::{Intent, IntentOutcome};

/// Result of preparing a join-by-code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinPlan {
    /// A local session already carries the code; it is now active
    Local(SessionId),
    /// Dial these candidates in order
    Discover {
        code: ShortCode,
        candidates: Vec<PeerId>,
    },
}

// ----------------------------------------------------------------------------
// Role Transitions
// ----------------------------------------------------------------------------

impl ReplicationContext {
    /// The transport opened without a launch Host: start hosting
    pub fn become_host(&mut self, local: PeerId) {
        if let Err(e) = self.role.assign_host(local.clone()) {
            warn!("Cannot host as {}: {}", local, e);
            return;
        }
        match self.directory.register_all(&self.store, &local) {
            Ok(count) => debug!("Registered {} session codes for {}", count, local),
            Err(e) => error!("Failed to register session codes: {}", e),
        }
        info!("Hosting as {}", local);
        self.notify(Notice::Hosting { peer: local });
    }

    /// The link to `host` opened: become its Client and ask for a snapshot
    pub fn become_client(&mut self, host: PeerId, link: ConnectionHandle) -> Result<()> {
        if let Err(e) = self.role.assign_client(host.clone()) {
            link.close();
            return Err(e.into());
        }
        self.attach_host_link(link);
        Ok(())
    }

    /// Track a (re)opened Host link and request a snapshot over it
    pub fn attach_host_link(&mut self, link: ConnectionHandle) {
        let host = link.peer().clone();
        link.send(Message::RequestSync);
        self.connections.set_host_link(link);
        self.notify(Notice::Connected { host });
    }

    /// A peer dialed us
    pub fn on_incoming(&mut self, connection: ConnectionHandle) {
        if !self.role.is_host() {
            debug!(
                "Refusing inbound link from {} while {}",
                connection.peer(),
                self.role.role()
            );
            connection.close();
            return;
        }
        let active = self.active_session();
        connection.send(Message::sync(&self.store, active.as_ref()));
        self.connections.add_inbound(connection);
    }

    /// A link closed; returns the Host identity when it was our Host link
    pub fn on_closed(&mut self, connection: ConnectionId) -> Option<PeerId> {
        let was_host_link = self.connections.is_host_link(connection);
        let removed = self.connections.remove(connection)?;
        if was_host_link {
            warn!("Lost connection to host {}", removed.peer());
            self.notify(Notice::Disconnected {
                host: removed.peer().clone(),
            });
            return Some(removed.peer().clone());
        }
        None
    }

    /// Keep-alive tick: Clients ping an open Host link
    pub fn keepalive(&self) {
        if !self.role.is_client() {
            return;
        }
        if let Some(link) = self.connections.host_link() {
            if link.is_open() {
                link.send(Message::Ping);
            }
        }
    }

    /// Expiry tick: authoritative processes reset sessions past their duration
    pub fn check_expiry(&mut self) {
        if !self.role.role().is_authoritative() {
            return;
        }
        let duration = self.config.replication.session_duration();
        if self.mutator.reset_expired(&mut self.store, duration).is_applied() {
            self.commit();
        }
    }
}

// ----------------------------------------------------------------------------
// Protocol Handlers
// ----------------------------------------------------------------------------

impl ReplicationContext {
    /// Dispatch a decoded message by role
    pub fn on_message(&mut self, connection: ConnectionId, message: Message) {
        if self.connections.get(connection).is_none() {
            debug!("Dropping {} from untracked {}", message.kind(), connection);
            return;
        }
        debug!("Received {} on {}", message.kind(), connection);
        if self.role.is_host() {
            self.handle_host_message(connection, message);
        } else if self.connections.is_host_link(connection) {
            self.handle_client_message(message);
        }
    }

    fn handle_host_message(&mut self, connection: ConnectionId, message: Message) {
        match message {
            Message::RequestSync => {
                let active = self.active_session();
                if let Some(link) = self.connections.get(connection) {
                    link.send(Message::sync(&self.store, active.as_ref()));
                }
            }
            Message::Ping => {
                if let Some(link) = self.connections.get(connection) {
                    link.send(Message::Pong);
                }
            }
            Message::ForceSessionSwitch { session_id } => {
                if !self.store.contains(&session_id) {
                    debug!("Ignoring switch to unknown session {}", session_id);
                    return;
                }
                self.switch_to(session_id.clone());
                let relay = Message::ForceSessionSwitch { session_id };
                for other in self.connections.inbound_except(connection) {
                    other.send(relay.clone());
                }
            }
            Message::SyncSessions { .. } | Message::Pong => {
                debug!("Host ignoring {}", message.kind());
            }
            message => match Mutation::try_from(message) {
                Ok(mutation) => {
                    if self.mutator.apply(&mut self.store, &mutation).is_applied() {
                        self.commit();
                    }
                }
                Err(other) => debug!("Host ignoring {}", other.kind()),
            },
        }
    }

    fn handle_client_message(&mut self, message: Message) {
        match message {
            Message::SyncSessions {
                data,
                current_session_id,
            } => {
                self.store = data;
                if let Some(code) = self.joining.take() {
                    if let Some(session) = self.store.find_by_code(&code) {
                        self.active = Some(session.id.clone());
                    }
                }
                let keep = self
                    .active
                    .as_ref()
                    .is_some_and(|id| self.store.contains(id));
                if !keep {
                    self.active = current_session_id;
                }
                debug!("Replaced store with {} sessions from host", self.store.len());
                self.render();
            }
            Message::ForceSessionSwitch { session_id } => {
                self.switch_to(session_id);
            }
            Message::Pong => {}
            other => debug!("Client ignoring {}", other.kind()),
        }
    }

    pub fn on_undecodable(&self, connection: ConnectionId, reason: &str) {
        warn!("Dropping undecodable frame on {}: {}", connection, reason);
    }

    fn switch_to(&mut self, session: SessionId) {
        self.active = Some(session.clone());
        self.render();
        self.notify(Notice::SessionSwitched { session });
    }
}

// ----------------------------------------------------------------------------
// Intent Handlers
// ----------------------------------------------------------------------------

impl ReplicationContext {
    /// Handle every intent except joining and shutdown, which the loop owns
    pub fn handle_intent(&mut self, intent: Intent) -> Result<IntentOutcome> {
        if let Some(action) = intent.admin_action() {
            if !self.admin.is_admin() {
                return Err(self.reject(InputError::AdminRequired { action }.into()));
            }
        }

        match intent {
            Intent::Ask { text } => self.submit(|session_id| Mutation::SubmitQuestion { session_id, text }),
            Intent::Upvote { question } => self.submit(|session_id| Mutation::Upvote {
                session_id,
                question_id: question,
            }),
            Intent::React { question, emoji } => {
                self.react(question, emoji, ReactionAction::Add)
            }
            Intent::Unreact { question, emoji } => {
                self.react(question, emoji, ReactionAction::Remove)
            }
            Intent::Comment { question, text } => self.submit(|session_id| Mutation::Comment {
                session_id,
                question_id: question,
                text,
            }),
            Intent::Delete { question } => self.submit(|session_id| Mutation::DeleteQuestion {
                session_id,
                question_id: question,
            }),
            Intent::ToggleAnswered { question } => {
                self.submit(|session_id| Mutation::ToggleAnswered {
                    session_id,
                    question_id: question,
                })
            }
            Intent::CreateSession { name } => {
                self.ensure_authoritative("create sessions")?;
                self.create_session(&name)
            }
            Intent::DeleteSession { session } => {
                self.ensure_authoritative("delete sessions")?;
                Ok(self.delete_session(&session))
            }
            Intent::SwitchSession { session } => Ok(self.switch_session(session)),
            Intent::ForceSwitch { session } => Ok(self.force_switch(session)),
            Intent::Status => Ok(IntentOutcome::Status(self.status())),
            Intent::Snapshot => Ok(IntentOutcome::Snapshot {
                store: self.store.clone(),
                active: self.active_session(),
            }),
            Intent::JoinByCode { .. } | Intent::Shutdown => {
                Ok(IntentOutcome::Ignored("handled by the replication loop"))
            }
        }
    }

    /// Session changes belong to the Host while its link is open
    fn ensure_authoritative(&mut self, action: &'static str) -> Result<()> {
        let route = self
            .handler
            .route(self.role.role(), self.connections.is_host_link_open());
        if route == Route::Forward {
            return Err(self.reject(RoleError::NotHost { action }.into()));
        }
        Ok(())
    }

    fn react(
        &mut self,
        question: QuestionId,
        emoji: String,
        action: ReactionAction,
    ) -> Result<IntentOutcome> {
        self.submit(|session_id| Mutation::React {
            session_id,
            question_id: question,
            emoji,
            action,
        })
    }

    /// Validate a mutation against the active session, then route it
    fn submit(&mut self, build: impl FnOnce(SessionId) -> Mutation) -> Result<IntentOutcome> {
        let session = match self.active_session() {
            Some(session) => session,
            None => return Err(self.reject(InputError::NoActiveSession.into())),
        };
        let mutation = build(session);
        if let Err(e) = mutation.validate() {
            return Err(self.reject(e.into()));
        }

        let route = self
            .handler
            .route(self.role.role(), self.connections.is_host_link_open());
        if route == Route::Forward {
            let message = mutation.clone().into_message();
            if let Some(link) = self.connections.host_link() {
                if link.send(message) {
                    debug!("Forwarded {} to {}", mutation.kind(), link.peer());
                    return Ok(IntentOutcome::Forwarded);
                }
            }
            debug!("Host link unavailable, applying {} locally", mutation.kind());
        }

        Ok(self.apply_local(&mutation))
    }

    fn apply_local(&mut self, mutation: &Mutation) -> IntentOutcome {
        match self.mutator.apply(&mut self.store, mutation) {
            Outcome::Applied => {
                self.commit();
                IntentOutcome::Applied
            }
            Outcome::Ignored(reason) => IntentOutcome::Ignored(reason),
        }
    }

    /// Create a session, register its code when hosting, and make it active
    pub fn create_session(&mut self, name: &str) -> Result<IntentOutcome> {
        let session = match self
            .mutator
            .create_session(&mut self.store, name, &mut self.rng)
        {
            Ok(session) => session,
            Err(e) => return Err(self.reject(e.into())),
        };

        if let (true, Some(code), Some(host)) = (
            self.role.is_host(),
            session.short_code.as_ref(),
            self.role.local_peer(),
        ) {
            if let Err(e) = self.directory.register(code, host) {
                error!("Failed to register code {}: {}", code, e);
            }
        }

        info!("Created session {} ({})", session.id, session.name);
        self.active = Some(session.id.clone());
        self.commit();
        if let Some(code) = session.short_code.clone() {
            self.notify(Notice::SessionCreated {
                session: session.id.clone(),
                code,
            });
        }
        Ok(IntentOutcome::SessionCreated(session))
    }

    /// Delete a session; the active session falls back if it was removed
    pub fn delete_session(&mut self, session: &SessionId) -> IntentOutcome {
        match self.mutator.delete_session(&mut self.store, session) {
            Outcome::Applied => {
                if self.active.as_ref() == Some(session) {
                    self.active = self.store.resolve_active(None);
                }
                info!("Deleted session {}", session);
                self.commit();
                IntentOutcome::Applied
            }
            Outcome::Ignored(reason) => IntentOutcome::Ignored(reason),
        }
    }

    pub fn switch_session(&mut self, session: SessionId) -> IntentOutcome {
        if !self.store.contains(&session) {
            return IntentOutcome::Ignored("unknown session");
        }
        self.switch_to(session.clone());
        IntentOutcome::Switched(session)
    }

    /// Switch locally, then push the switch to every peer
    pub fn force_switch(&mut self, session: SessionId) -> IntentOutcome {
        let outcome = self.switch_session(session.clone());
        if outcome != IntentOutcome::Switched(session.clone()) {
            return outcome;
        }

        let message = Message::ForceSessionSwitch {
            session_id: session,
        };
        if self.role.is_host() {
            for connection in self.connections.inbound() {
                connection.send(message.clone());
            }
        } else if let Some(link) = self.connections.host_link() {
            link.send(message);
        }
        outcome
    }

    /// Resolve a code locally, or plan discovery when joining is allowed
    pub fn prepare_join(&mut self, code: &str) -> Result<JoinPlan> {
        let code = match ShortCode::normalize(code) {
            Ok(code) => code,
            Err(e) => return Err(self.reject(e.into())),
        };

        if let Some(session) = self.store.find_by_code(&code) {
            let id = session.id.clone();
            self.switch_to(id.clone());
            return Ok(JoinPlan::Local(id));
        }

        if let Err(e) = self.role.ensure_can_join() {
            return Err(self.reject(TanyaError::from(e)));
        }

        let candidates = match self.directory.lookup(&code) {
            Some(host) => {
                debug!("Directory maps {} to {}", code, host);
                vec![host]
            }
            None => discovery_candidates(&code),
        };
        self.joining = Some(code.clone());
        Ok(JoinPlan::Discover { code, candidates })
    }
}
