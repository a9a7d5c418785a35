//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Live audience Q&A over a peer-to-peer link", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Data directory for session persistence
    #[arg(short, long, global = true)]
    pub data_dir: Option<String>,

    /// Address the WebSocket listener binds to when hosting
    #[arg(short, long, global = true)]
    pub listen: Option<String>,

    /// Enable admin actions (delete, answer, sessions, forced switches)
    #[arg(short, long, global = true)]
    pub admin: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Host sessions and accept participants
    Host {
        /// Create a session with this name on startup
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Join a Host through a shared link or a session code
    Join {
        /// Join link carrying `?host=` and a session fragment
        #[arg(required_unless_present = "code", conflicts_with = "code")]
        link: Option<String>,
        /// Six-character session code
        #[arg(long)]
        code: Option<String>,
    },
    /// Print the join link for a session
    Link {
        /// Session identifier placed in the link fragment
        session: String,
        /// Host identifier, defaults to the configured listen address
        #[arg(long)]
        host: Option<String>,
    },
}
