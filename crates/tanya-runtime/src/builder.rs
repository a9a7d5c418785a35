//! Runtime Builder API
//!
//! Provides a builder-style API for consumers (CLI and tests) to pick a
//! transport, inject collaborators and get an intent handle back.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tanya_core::{
    AdminFlag, AdminGate, JoinLink, KeyValueStore, MemoryKeyValueStore, NullPresenter, PeerId,
    Presenter, QuestionId, Result, SessionId, SessionStore, SystemTimeSource, TanyaConfig,
    TanyaError, TimeSource, Transport,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::intent::{Intent, IntentOutcome, IntentRequest, IntentSender, RuntimeStatus};
use crate::logic::{Collaborators, Launch, ReplicationContext, ReplicationTask};

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

/// Builder for a replication runtime
pub struct RuntimeBuilder {
    transport: Arc<dyn Transport>,
    config: TanyaConfig,
    storage: Arc<dyn KeyValueStore>,
    presenter: Arc<dyn Presenter>,
    admin: Arc<dyn AdminGate>,
    time: Arc<dyn TimeSource>,
    launch: Launch,
    session: Option<SessionId>,
    seed: Option<u64>,
}

impl RuntimeBuilder {
    /// Create a builder that hosts on `transport` with in-memory storage
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: TanyaConfig::default(),
            storage: Arc::new(MemoryKeyValueStore::new()),
            presenter: Arc::new(NullPresenter),
            admin: Arc::new(AdminFlag::new(false)),
            time: Arc::new(SystemTimeSource),
            launch: Launch::Host,
            session: None,
            seed: None,
        }
    }

    /// Set the protocol configuration
    pub fn with_config(mut self, config: TanyaConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the key-value backend for sessions and the code directory
    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn with_admin_gate(mut self, admin: Arc<dyn AdminGate>) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// Dial `host` as a Client instead of hosting
    pub fn with_host(mut self, host: PeerId) -> Self {
        self.launch = Launch::Client(host);
        self
    }

    /// Launch from a join link: its host selects the Client role, its fragment the session
    pub fn with_link(mut self, link: JoinLink) -> Self {
        if let Some(host) = link.host {
            self.launch = Launch::Client(host);
        }
        self.session = link.session;
        self
    }

    /// Stay Unconnected and join the Host serving `code`
    pub fn with_join_code(mut self, code: impl Into<String>) -> Self {
        self.launch = Launch::JoinCode(code.into());
        self
    }

    /// Initial active session
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    /// Seed the short-code generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build and start the runtime
    pub async fn build_and_start(self) -> Result<RuntimeHandle> {
        self.config
            .validate()
            .map_err(|reason| TanyaError::Config { reason })?;
        info!(
            "Building Tanya runtime on {} transport ({:?})",
            self.transport.name(),
            self.launch
        );

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let collaborators = Collaborators {
            storage: self.storage,
            presenter: self.presenter,
            admin: self.admin,
            time: self.time,
        };

        let (intent_sender, intent_receiver) = mpsc::channel(self.config.channels.intent_buffer_size);
        let context = ReplicationContext::new(self.config, collaborators, rng);
        let task = ReplicationTask::new(
            context,
            self.transport,
            self.launch,
            self.session,
            intent_receiver,
        );
        let task_handle = tokio::spawn(task.run());

        info!("Tanya runtime started");
        Ok(RuntimeHandle {
            intent_sender,
            task_handle: Some(task_handle),
            running: true,
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to a running replication runtime
pub struct RuntimeHandle {
    intent_sender: IntentSender,
    task_handle: Option<JoinHandle<Result<()>>>,
    running: bool,
}

impl RuntimeHandle {
    /// A sender for submitting intents from other tasks
    pub fn intent_sender(&self) -> IntentSender {
        self.intent_sender.clone()
    }

    /// Submit an intent and wait for its outcome
    pub async fn submit(&self, intent: Intent) -> Result<IntentOutcome> {
        submit(&self.intent_sender, intent).await
    }

    pub async fn ask(&self, text: impl Into<String>) -> Result<IntentOutcome> {
        self.submit(Intent::Ask { text: text.into() }).await
    }

    pub async fn upvote(&self, question: QuestionId) -> Result<IntentOutcome> {
        self.submit(Intent::Upvote { question }).await
    }

    pub async fn create_session(&self, name: impl Into<String>) -> Result<IntentOutcome> {
        self.submit(Intent::CreateSession { name: name.into() }).await
    }

    pub async fn join_by_code(&self, code: impl Into<String>) -> Result<IntentOutcome> {
        self.submit(Intent::JoinByCode { code: code.into() }).await
    }

    pub async fn status(&self) -> Result<RuntimeStatus> {
        match self.submit(Intent::Status).await? {
            IntentOutcome::Status(status) => Ok(status),
            _ => Err(TanyaError::Stopped),
        }
    }

    /// Current store and resolved active session
    pub async fn snapshot(&self) -> Result<(SessionStore, Option<SessionId>)> {
        match self.submit(Intent::Snapshot).await? {
            IntentOutcome::Snapshot { store, active } => Ok((store, active)),
            _ => Err(TanyaError::Stopped),
        }
    }

    /// Check if the runtime is still running
    pub fn is_running(&self) -> bool {
        self.running && self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the runtime to complete
    pub async fn wait(&mut self) -> Result<()> {
        match self.task_handle.take() {
            Some(handle) => handle.await.map_err(|_| TanyaError::Stopped)?,
            None => Ok(()),
        }
    }

    /// Shutdown the runtime gracefully
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down Tanya runtime");
        let _ = self.submit(Intent::Shutdown).await;

        if let Some(handle) = self.task_handle.take() {
            if tokio::time::timeout(Duration::from_secs(10), handle).await.is_err() {
                info!("Replication task did not stop in time");
            }
        }

        self.running = false;
        info!("Tanya runtime shut down");
        Ok(())
    }
}

/// Send an intent on `sender` and wait for its reply
pub async fn submit(sender: &IntentSender, intent: Intent) -> Result<IntentOutcome> {
    let (request, reply) = IntentRequest::new(intent);
    sender.send(request).await.map_err(|_| TanyaError::Stopped)?;
    reply.await.map_err(|_| TanyaError::Stopped)?
}
