//! Error types for the sync engine.

use thiserror::Error;
use vtsync_protocol::{KeyError, ProtocolError, RequestKind};

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the local revision store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Reading from the store failed.
    #[error("store read failed: {0}")]
    Read(String),

    /// Writing to the store failed.
    #[error("store write failed: {0}")]
    Write(String),
}

/// Errors that can occur during sync operations.
///
/// An operation records at most one of these as its terminal error. They are
/// surfaced through completion handlers and logs, never by panicking.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The operation's key is malformed, or a pattern was used where a
    /// concrete key is required.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    /// A wildcard key was used to publish a value.
    #[error("cannot publish a value to pattern {0}")]
    PatternPublish(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The response had the wrong kind or lacked a required payload.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Server rejected the request.
    #[error("server error: {0}")]
    Server(String),

    /// Local revision store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(String),

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a malformed-response error for a response of the wrong kind.
    pub fn unexpected_response(expected: RequestKind, actual: RequestKind) -> Self {
        Self::MalformedResponse(format!("expected {expected} response, got {actual}"))
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidKey(e) => SyncError::InvalidKey(e),
            ProtocolError::Codec(message) => SyncError::Codec(message),
        }
    }
}
