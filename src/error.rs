//! Unified error types for the session layer

use thiserror::Error;

use crate::engine::HandleId;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the session layer
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The engine could not produce a handle
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A display was requested while another consumer still holds it
    #[error("Display already acquired for handle {0}")]
    DisplayAlreadyAcquired(HandleId),

    /// Persisted engine state could not be applied
    #[error("Restore data corrupt: {0}")]
    RestoreDataCorrupt(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Operation on a session that was shut down
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new engine unavailable error
    pub fn engine_unavailable<S: Into<String>>(msg: S) -> Self {
        Error::EngineUnavailable(msg.into())
    }

    /// Create a new restore data corrupt error
    pub fn restore_data_corrupt<S: Into<String>>(msg: S) -> Self {
        Error::RestoreDataCorrupt(msg.into())
    }

    /// Create a new session not found error
    pub fn session_not_found<S: Into<String>>(id: S) -> Self {
        Error::SessionNotFound(id.into())
    }

    /// Create a new session closed error
    pub fn session_closed<S: Into<String>>(id: S) -> Self {
        Error::SessionClosed(id.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether the error leaves the caller with no usable engine handle
    pub fn is_engine_unavailable(&self) -> bool {
        matches!(self, Error::EngineUnavailable(_))
    }
}
