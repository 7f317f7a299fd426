//! Error types for the scout application
//!
//! Provides a unified error type for persistence, configuration, the HTTP
//! gateway and engine calls made from the CLI.

use scout_checkpoint::CheckpointError;
use scout_core::EngineError;
use std::fmt;

/// Result type alias for scout operations
pub type Result<T> = std::result::Result<T, ScoutError>;

/// Main error type for scout operations
#[derive(Debug)]
pub enum ScoutError {
    /// Configuration error
    Config(String),

    /// Database error
    Database(String),

    /// Capability gateway error
    Gateway(String),

    /// Not found error
    NotFound(String),

    /// Engine error (job lifecycle)
    Engine(EngineError),

    /// Checkpoint storage error
    Checkpoint(CheckpointError),

    /// IO error
    Io(std::io::Error),

    /// Serialization/deserialization error
    Serde(serde_json::Error),

    /// SQL error
    Sqlx(sqlx::Error),

    /// HTTP client error
    Http(reqwest::Error),

    /// Generic error with message
    Other(String),
}

impl fmt::Display for ScoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Database(msg) => write!(f, "Database error: {}", msg),
            Self::Gateway(msg) => write!(f, "Gateway error: {}", msg),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::Engine(err) => write!(f, "{}", err),
            Self::Checkpoint(err) => write!(f, "Checkpoint error: {}", err),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Serde(err) => write!(f, "Serialization error: {}", err),
            Self::Sqlx(err) => write!(f, "SQL error: {}", err),
            Self::Http(err) => write!(f, "HTTP error: {}", err),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ScoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err),
            Self::Checkpoint(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Serde(err) => Some(err),
            Self::Sqlx(err) => Some(err),
            Self::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EngineError> for ScoutError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<CheckpointError> for ScoutError {
    fn from(err: CheckpointError) -> Self {
        Self::Checkpoint(err)
    }
}

impl From<std::io::Error> for ScoutError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err)
    }
}

impl From<sqlx::Error> for ScoutError {
    fn from(err: sqlx::Error) -> Self {
        Self::Sqlx(err)
    }
}

impl From<reqwest::Error> for ScoutError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl From<anyhow::Error> for ScoutError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for ScoutError {
    fn from(msg: String) -> Self {
        Self::Other(msg)
    }
}

impl From<&str> for ScoutError {
    fn from(msg: &str) -> Self {
        Self::Other(msg.to_string())
    }
}
