//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Reasons a key identifier is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The identifier is empty.
    #[error("key is empty")]
    Empty,

    /// The identifier exceeds the maximum length.
    #[error("key is {len} bytes, maximum is {max}")]
    TooLong {
        /// Actual length in bytes.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// A segment between two separators is empty.
    #[error("key has an empty segment at position {position}")]
    EmptySegment {
        /// Zero-based segment index.
        position: usize,
    },

    /// A character outside the allowed set was found.
    #[error("invalid character {ch:?} in key")]
    InvalidCharacter {
        /// The offending character.
        ch: char,
    },

    /// A wildcard is mixed with other characters or `**` is not the last segment.
    #[error("misplaced wildcard in segment {position}")]
    MisplacedWildcard {
        /// Zero-based segment index.
        position: usize,
    },
}

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Key validation failed.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    /// CBOR encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl ProtocolError {
    /// Creates a codec error from any displayable cause.
    pub fn codec(cause: impl std::fmt::Display) -> Self {
        Self::Codec(cause.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = KeyError::TooLong { len: 300, max: 256 };
        assert!(err.to_string().contains("300"));
        assert!(err.to_string().contains("256"));

        let err = ProtocolError::from(KeyError::Empty);
        assert_eq!(err.to_string(), "invalid key: key is empty");
    }
}
