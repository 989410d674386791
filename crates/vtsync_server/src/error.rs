//! Error types for the sync server.

use thiserror::Error;
use vtsync_protocol::{AclId, KeyError, ProtocolError};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request names a malformed key.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    /// A value was published to a pattern.
    #[error("cannot publish to pattern {0}")]
    PatternPublish(String),

    /// The publish names an ACL the server does not know.
    #[error("unknown acl: {0}")]
    UnknownAcl(AclId),

    /// Request or response bytes could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl ServerError {
    /// Returns true if the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServerError::Codec(_))
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidKey(e) => ServerError::InvalidKey(e),
            ProtocolError::Codec(message) => ServerError::Codec(message),
        }
    }
}
