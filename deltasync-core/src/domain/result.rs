//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    /// Network failure or an undecodable response body
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Store error: {0}")]
    Store(String),

    /// A value-bundle did not carry one of the configured columns
    #[error(
        "Extraction error: record '{timestamp}' for '{identifier}' is missing column '{column}'"
    )]
    Extraction {
        identifier: String,
        timestamp: String,
        column: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the sync engine may skip the current identifier and carry on.
    ///
    /// Only transport failures qualify. Everything else stops the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
