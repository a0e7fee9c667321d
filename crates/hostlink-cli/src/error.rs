//! Error handling for the hostlink CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("hostlink error: {0}")]
    Hostlink(#[from] hostlink_core::HostlinkError),

    #[error("Transport error: {0}")]
    Transport(#[from] hostlink_core::TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No host to connect to: {0}")]
    NoHost(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<tokio::task::JoinError> for CliError {
    fn from(err: tokio::task::JoinError) -> Self {
        CliError::Task(err.to_string())
    }
}
