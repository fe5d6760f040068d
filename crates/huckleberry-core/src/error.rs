//! Error types for the Huckleberry bridge
//!
//! This module defines all error types used throughout the crate, plus the
//! structured [`SetupFailure`] reason surfaced to the host when setup aborts.

use crate::model::StreamKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the Huckleberry bridge
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid credentials (fatal to setup)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The account has no children (fatal to setup)
    #[error("No data: {0}")]
    NoData(String),

    /// Connectivity failure during an API call
    #[error("Network error: {0}")]
    TransientNetwork(String),

    /// Registering one child/stream listener failed
    #[error("Listener registration failed for {child_id}/{stream}: {message}")]
    ListenerRegistration {
        /// Child the listener was meant for
        child_id: String,
        /// Stream kind of the listener
        stream: StreamKind,
        /// Error message
        message: String,
    },

    /// An action referenced a child that is not known
    #[error("Unknown child: {0}")]
    UnknownChild(String),

    /// Invalid input (unknown service name, malformed parameters)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Blocking hand-off to the worker pool failed
    #[error("Executor error: {0}")]
    Executor(String),

    /// Filesystem errors (seed files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a "no data" error
    pub fn no_data(msg: impl Into<String>) -> Self {
        Self::NoData(msg.into())
    }

    /// Create a transient network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::TransientNetwork(msg.into())
    }

    /// Create a listener registration error
    pub fn listener(
        child_id: impl Into<String>,
        stream: StreamKind,
        message: impl Into<String>,
    ) -> Self {
        Self::ListenerRegistration {
            child_id: child_id.into(),
            stream,
            message: message.into(),
        }
    }

    /// Create an unknown child error
    pub fn unknown_child(child_id: impl Into<String>) -> Self {
        Self::UnknownChild(child_id.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an executor error
    pub fn executor(msg: impl Into<String>) -> Self {
        Self::Executor(msg.into())
    }

    /// Structured setup failure reason for this error
    pub fn setup_failure(&self) -> SetupFailure {
        match self {
            Error::Authentication(_) => SetupFailure::InvalidAuth,
            Error::NoData(_) => SetupFailure::NoChildren,
            _ => SetupFailure::CannotConnect,
        }
    }
}

/// Reason reported to the host when setup aborts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupFailure {
    /// Credentials were rejected
    InvalidAuth,
    /// The account has no children
    NoChildren,
    /// The service could not be reached
    CannotConnect,
}

impl SetupFailure {
    /// Stable key for host translation tables
    pub fn key(&self) -> &'static str {
        match self {
            SetupFailure::InvalidAuth => "invalid_auth",
            SetupFailure::NoChildren => "no_children",
            SetupFailure::CannotConnect => "cannot_connect",
        }
    }
}

impl std::fmt::Display for SetupFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
