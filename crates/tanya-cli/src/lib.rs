//! Tanya CLI library
//!
//! Command-line front end for Tanya: argument parsing, TOML configuration,
//! file-backed persistence, a terminal presenter and the interactive command
//! loop that feeds intents into the replication runtime.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod presenter;
pub mod storage;

pub use cli::{Cli, Commands};
pub use commands::{CommandDispatcher, LineCommand};
pub use config::{AppConfig, TransportKind};
pub use error::{CliError, Result};
pub use presenter::TerminalPresenter;
pub use storage::FileKeyValueStore;
