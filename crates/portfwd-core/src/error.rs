//! Error types for the port forwarding system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for port forwarding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the port forwarding system
#[derive(Error, Debug)]
pub enum Error {
    /// A hostname or bind request could not be resolved to a socket address
    #[error("Unable to resolve {target}: {reason}")]
    Resolution {
        /// Host (or wildcard bind) that was being resolved
        target: String,
        /// Resolver failure description
        reason: String,
    },

    /// The protocol engine refused to open a session
    #[error("Session error: {0}")]
    Session(String),

    /// The protocol engine refused to create the mapping request
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Engine-specific error
    #[error("Engine error ({engine}): {message}")]
    Engine {
        /// Engine name
        engine: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a resolution error
    pub fn resolution(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a session error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a mapping error
    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::Mapping(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an engine-specific error
    pub fn engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Whether the error is something the operator has to fix in the
    /// configuration rather than a transient fault
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Resolution { .. } | Self::Config(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
