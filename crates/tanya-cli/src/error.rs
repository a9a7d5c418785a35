//! Error handling for the Tanya CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Tanya error: {0}")]
    Tanya(#[from] tanya_core::TanyaError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] tanya_core::PersistenceError),

    #[error("Invalid command: {0}")]
    Command(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Config(format!("{:#}", err))
    }
}

impl From<tanya_core::InputError> for CliError {
    fn from(err: tanya_core::InputError) -> Self {
        CliError::Tanya(err.into())
    }
}

impl From<tanya_core::ProtocolError> for CliError {
    fn from(err: tanya_core::ProtocolError) -> Self {
        CliError::Tanya(err.into())
    }
}
