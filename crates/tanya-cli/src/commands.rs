//! Command handlers for the Tanya CLI

use std::sync::Arc;

use tanya_core::{
    AdminFlag, JoinLink, KeyValueStore, PeerId, QuestionId, SessionId, Transport,
};
use tanya_runtime::{
    Intent, IntentOutcome, MemoryNetwork, RuntimeBuilder, RuntimeHandle, RuntimeStatus,
    WebSocketTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::cli::{Cli, Commands};
use crate::config::{AppConfig, TransportKind};
use crate::error::{CliError, Result};
use crate::presenter::TerminalPresenter;
use crate::storage::FileKeyValueStore;

const HELP: &str = "\
Commands:
  ask <text>                 submit a question
  upvote <id>                upvote a question
  react <id> <emoji>         add a reaction
  unreact <id> <emoji>       remove a reaction (admin)
  comment <id> <text>        comment on a question
  answer <id>                toggle answered (admin)
  delete <id>                delete a question (admin)
  new <name>                 create a session and switch to it (admin)
  drop <session>             delete a session (admin)
  switch <session>           switch the session you are viewing
  force <session>            switch everyone to a session (admin)
  code <CODE>                join a session by its code
  link                       print the join link for the active session
  status                     show role and connections
  help                       show this help
  quit                       leave";

// ----------------------------------------------------------------------------
// Line Commands
// ----------------------------------------------------------------------------

/// A command typed into the interactive loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineCommand {
    Submit(Intent),
    Code(String),
    Link,
    Status,
    Help,
    Quit,
}

impl LineCommand {
    /// Parse one input line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "ask" => Self::Submit(Intent::Ask {
                text: required(rest, "ask <text>")?.to_string(),
            }),
            "upvote" => Self::Submit(Intent::Upvote {
                question: question_id(rest, "upvote <id>")?,
            }),
            "react" => {
                let (question, emoji) = id_and_text(rest, "react <id> <emoji>")?;
                Self::Submit(Intent::React { question, emoji })
            }
            "unreact" => {
                let (question, emoji) = id_and_text(rest, "unreact <id> <emoji>")?;
                Self::Submit(Intent::Unreact { question, emoji })
            }
            "comment" => {
                let (question, text) = id_and_text(rest, "comment <id> <text>")?;
                Self::Submit(Intent::Comment { question, text })
            }
            "answer" => Self::Submit(Intent::ToggleAnswered {
                question: question_id(rest, "answer <id>")?,
            }),
            "delete" => Self::Submit(Intent::Delete {
                question: question_id(rest, "delete <id>")?,
            }),
            "new" => Self::Submit(Intent::CreateSession {
                name: required(rest, "new <name>")?.to_string(),
            }),
            "drop" => Self::Submit(Intent::DeleteSession {
                session: SessionId::from(required(rest, "drop <session>")?),
            }),
            "switch" => Self::Submit(Intent::SwitchSession {
                session: SessionId::from(required(rest, "switch <session>")?),
            }),
            "force" => Self::Submit(Intent::ForceSwitch {
                session: SessionId::from(required(rest, "force <session>")?),
            }),
            "code" => Self::Code(required(rest, "code <CODE>")?.to_string()),
            "link" => Self::Link,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => {
                return Err(CliError::Command(format!(
                    "unknown command '{}', type 'help'",
                    other
                )))
            }
        };
        Ok(Some(command))
    }
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str> {
    if rest.is_empty() {
        Err(CliError::Command(format!("usage: {}", usage)))
    } else {
        Ok(rest)
    }
}

fn question_id(rest: &str, usage: &str) -> Result<QuestionId> {
    Ok(required(rest, usage)?.parse::<QuestionId>()?)
}

fn id_and_text(rest: &str, usage: &str) -> Result<(QuestionId, String)> {
    let (id, text) = required(rest, usage)?
        .split_once(char::is_whitespace)
        .ok_or_else(|| CliError::Command(format!("usage: {}", usage)))?;
    Ok((id.parse::<QuestionId>()?, text.trim().to_string()))
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        let admin = cli.admin;
        match cli.command {
            Commands::Host { name } => Self::handle_host_command(config, admin, name).await,
            Commands::Join { link, code } => {
                Self::handle_join_command(config, admin, link, code).await
            }
            Commands::Link { session, host } => {
                let link = Self::handle_link_command(&config, session, host)?;
                println!("{}", link);
                Ok(())
            }
        }
    }

    /// Handle the host command
    async fn handle_host_command(config: AppConfig, admin: bool, name: Option<String>) -> Result<()> {
        let transport = Self::transport(&config, true)?;
        let builder = Self::builder(&config, transport, admin)?;
        let mut handle = builder.build_and_start().await?;

        if let Some(name) = name {
            match handle.create_session(name).await {
                Ok(outcome) => print_outcome(&outcome),
                Err(e) => warn!("Could not create the startup session: {}", e),
            }
        }
        Self::print_link(&handle).await?;
        Self::run_interactive(&mut handle).await
    }

    /// Handle the join command
    async fn handle_join_command(
        config: AppConfig,
        admin: bool,
        link: Option<String>,
        code: Option<String>,
    ) -> Result<()> {
        let transport = Self::transport(&config, false)?;
        let mut builder = Self::builder(&config, transport, admin)?;
        builder = match (link, code) {
            (Some(link), _) => {
                let link = JoinLink::parse(&link)?;
                if !link.is_client() {
                    return Err(CliError::Command(format!("{} does not name a host", link)));
                }
                info!("Joining through link {}", link);
                builder.with_link(link)
            }
            (None, Some(code)) => {
                info!("Joining session code {}", code);
                builder.with_join_code(code)
            }
            (None, None) => return Err(CliError::Command("a link or --code is required".into())),
        };

        let mut handle = builder.build_and_start().await?;
        Self::run_interactive(&mut handle).await
    }

    /// Build the join link for a session without starting the runtime
    pub fn handle_link_command(
        config: &AppConfig,
        session: String,
        host: Option<String>,
    ) -> Result<JoinLink> {
        let host = match host {
            Some(host) => host.parse::<PeerId>()?,
            None => match config.transport.kind {
                TransportKind::Websocket => PeerId::new(format!("ws://{}", config.listen_addr()?)),
                TransportKind::Memory => config
                    .transport
                    .peer_id
                    .as_deref()
                    .ok_or_else(|| CliError::Command("--host is required for the memory transport".into()))?
                    .parse::<PeerId>()?,
            },
        };
        Ok(JoinLink::new(
            &config.core.link.base_url,
            Some(host),
            Some(SessionId::new(session)),
        )?)
    }

    fn transport(config: &AppConfig, hosting: bool) -> Result<Arc<dyn Transport>> {
        let transport: Arc<dyn Transport> = match config.transport.kind {
            TransportKind::Websocket if hosting => {
                Arc::new(WebSocketTransport::listening(config.listen_addr()?))
            }
            TransportKind::Websocket => Arc::new(WebSocketTransport::dial_only()),
            TransportKind::Memory => {
                let network = MemoryNetwork::new();
                match &config.transport.peer_id {
                    Some(id) => Arc::new(network.transport_with_id(id.clone())),
                    None => Arc::new(network.transport()),
                }
            }
        };
        Ok(transport)
    }

    fn builder(config: &AppConfig, transport: Arc<dyn Transport>, admin: bool) -> Result<RuntimeBuilder> {
        let data_dir = config.data_dir();
        let storage: Arc<dyn KeyValueStore> = Arc::new(FileKeyValueStore::open(&data_dir)?);
        info!("Storing sessions in {}", data_dir.display());

        Ok(RuntimeBuilder::new(transport)
            .with_config(config.core.clone())
            .with_storage(storage)
            .with_presenter(Arc::new(TerminalPresenter::stdout()))
            .with_admin_gate(Arc::new(AdminFlag::new(admin))))
    }

    async fn print_link(handle: &RuntimeHandle) -> tanya_core::Result<()> {
        match handle.status().await?.join_link {
            Some(link) => println!("Share this link: {}", link),
            None => println!("No join link available while offline"),
        }
        Ok(())
    }

    /// Read commands from stdin until `quit`, end of input or Ctrl+C
    async fn run_interactive(handle: &mut RuntimeHandle) -> Result<()> {
        println!("Type 'help' for commands.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("Input closed");
                        break;
                    };
                    match LineCommand::parse(&line) {
                        Ok(Some(command)) => {
                            if !Self::handle_line_command(handle, command).await? {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => println!("{}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
            if !handle.is_running() {
                warn!("Runtime stopped unexpectedly");
                break;
            }
        }

        handle.shutdown().await?;
        Ok(())
    }

    /// Run one interactive command; `false` ends the loop
    async fn handle_line_command(handle: &RuntimeHandle, command: LineCommand) -> Result<bool> {
        let result = match command {
            LineCommand::Quit => return Ok(false),
            LineCommand::Help => {
                println!("{}", HELP);
                return Ok(true);
            }
            LineCommand::Status => handle.status().await.map(|status| print_status(&status)),
            LineCommand::Link => Self::print_link(handle).await,
            LineCommand::Code(code) => handle.join_by_code(code).await.map(|o| print_outcome(&o)),
            LineCommand::Submit(intent) => handle.submit(intent).await.map(|o| print_outcome(&o)),
        };

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_user_facing() => {
                // The presenter already showed the rejection
                debug!("Command rejected: {}", e);
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn print_outcome(outcome: &IntentOutcome) {
    match outcome {
        IntentOutcome::Applied | IntentOutcome::Status(_) | IntentOutcome::Snapshot { .. } => {}
        IntentOutcome::Forwarded => println!("sent to host"),
        IntentOutcome::Ignored(reason) => println!("nothing changed: {}", reason),
        IntentOutcome::SessionCreated(session) => {
            if let Some(code) = &session.short_code {
                println!("session {} ready, code {}", session.id, code);
            }
        }
        IntentOutcome::Switched(session) => println!("now viewing {}", session),
        IntentOutcome::JoinStarted => println!("looking for the session..."),
        IntentOutcome::Stopped => println!("stopped"),
    }
}

fn print_status(status: &RuntimeStatus) {
    println!("Role:        {}", status.role);
    if let Some(peer) = &status.local_peer {
        println!("Peer:        {}", peer);
    }
    if let Some(host) = &status.host_peer {
        println!("Host:        {}", host);
    }
    println!("Connections: {}", status.connections);
    println!(
        "Session:     {} of {}",
        status
            .active
            .as_ref()
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "none".into()),
        status.sessions
    );
    println!(
        "Links:       {} accepted, {} dialed, {} removed",
        status.stats.accepted, status.stats.dialed, status.stats.removed
    );
}
