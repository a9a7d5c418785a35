//! Configuration for the Tanya CLI
//!
//! The file format is TOML. Protocol sections (`[replication]`, `[discovery]`,
//! `[reconnect]`, `[channels]`, `[link]`) sit at the top level next to the
//! CLI-only `[transport]`, `[storage]` and `[logging]` sections. Every section
//! and every key is optional.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tanya_core::TanyaConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::{CliError, Result};

const DEFAULT_LISTEN: &str = "127.0.0.1:8765";

/// Transport adapter used by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Websocket,
    /// Process-local broker; only useful for solo sessions and demos
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// Listener address when hosting over WebSocket
    pub listen: String,
    /// Fixed identifier for the memory transport
    pub peer_id: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Websocket,
            listen: DEFAULT_LISTEN.to_string(),
            peer_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON file per stored key
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `tanya_runtime=debug`
    pub level: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub core: TanyaConfig,
    pub transport: TransportConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&raw)?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides on top of the file values
    pub fn apply_overrides(&mut self, cli: &Cli) -> Result<()> {
        if let Some(data_dir) = &cli.data_dir {
            self.storage.data_dir = Some(PathBuf::from(data_dir));
        }
        if let Some(listen) = &cli.listen {
            self.transport.listen = listen.clone();
        }
        self.validate()
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        self.core.validate().map_err(CliError::Config)?;

        if self.transport.kind == TransportKind::Websocket {
            self.listen_addr()?;
        }
        if let Some(peer_id) = &self.transport.peer_id {
            if peer_id.trim().is_empty() {
                return Err(CliError::Config("Transport peer id cannot be blank".into()));
            }
        }
        if let Some(level) = &self.logging.level {
            EnvFilter::try_new(level)
                .map_err(|e| CliError::Config(format!("Invalid log level {}: {}", level, e)))?;
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.transport.listen.parse().map_err(|e| {
            CliError::Config(format!(
                "Invalid listen address {}: {}",
                self.transport.listen, e
            ))
        })
    }

    /// Data directory, falling back to the platform data directory
    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join("tanya"))
                .unwrap_or_else(|| PathBuf::from(".tanya"))
        })
    }
}
