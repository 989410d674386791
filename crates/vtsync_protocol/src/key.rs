//! Keys identifying pub/sub resources.
//!
//! Keys are hierarchical names separated by `/` (e.g. `"room/5"`).
//! Subscriptions may use wildcard segments:
//! - `*` matches exactly one segment
//! - `**` matches one or more trailing segments (must be last)

use crate::error::KeyError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Maximum length of a key in bytes.
pub const MAX_KEY_LENGTH: usize = 256;

/// Separator between key segments.
pub const SEGMENT_SEPARATOR: char = '/';

/// Wildcard matching exactly one segment.
pub const SINGLE_WILDCARD: &str = "*";

/// Wildcard matching all remaining segments.
pub const MULTI_WILDCARD: &str = "**";

/// A pub/sub key.
///
/// A `Key` is immutable once constructed. Construction through [`Key::new`]
/// never fails: a malformed identifier is kept together with the reason it
/// was rejected, so that operations built on top of it can record the
/// validation error instead of failing at the call site. Use [`Key::parse`]
/// when a malformed identifier should be rejected immediately.
///
/// Equality, ordering and hashing only consider the identifier text.
#[derive(Clone, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Key {
    text: String,
    pattern: bool,
    error: Option<KeyError>,
}

impl Key {
    /// Creates a key, recording a validation error if the text is malformed.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        match validate(&text) {
            Ok(pattern) => Self {
                text,
                pattern,
                error: None,
            },
            Err(error) => Self {
                text,
                pattern: false,
                error: Some(error),
            },
        }
    }

    /// Creates a key, rejecting malformed identifiers.
    ///
    /// # Errors
    ///
    /// Returns the validation error if the identifier is malformed.
    pub fn parse(text: impl Into<String>) -> Result<Self, KeyError> {
        let key = Self::new(text);
        match key.error {
            Some(error) => Err(error),
            None => Ok(key),
        }
    }

    /// Returns the identifier text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns true if the key contains a wildcard segment.
    pub fn is_pattern(&self) -> bool {
        self.pattern
    }

    /// Returns the validation error, if the key is malformed.
    pub fn error(&self) -> Option<&KeyError> {
        self.error.as_ref()
    }

    /// Returns true if the key passed validation.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// Returns the segments of the key.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.text.split(SEGMENT_SEPARATOR)
    }

    /// Returns true if `other` is addressed by this key.
    ///
    /// A concrete key only matches itself. A pattern matches every key
    /// whose segments line up with its literal and wildcard segments.
    pub fn matches(&self, other: &Key) -> bool {
        if !self.pattern {
            return self.text == other.text;
        }

        let mut theirs = other.segments();
        for segment in self.segments() {
            match segment {
                MULTI_WILDCARD => return theirs.next().is_some(),
                SINGLE_WILDCARD => {
                    if theirs.next().is_none() {
                        return false;
                    }
                }
                literal => {
                    if theirs.next() != Some(literal) {
                        return false;
                    }
                }
            }
        }
        theirs.next().is_none()
    }
}

/// Validates key text, returning whether it is a pattern.
fn validate(text: &str) -> Result<bool, KeyError> {
    if text.is_empty() {
        return Err(KeyError::Empty);
    }
    if text.len() > MAX_KEY_LENGTH {
        return Err(KeyError::TooLong {
            len: text.len(),
            max: MAX_KEY_LENGTH,
        });
    }

    let last = text.split(SEGMENT_SEPARATOR).count() - 1;
    let mut pattern = false;

    for (position, segment) in text.split(SEGMENT_SEPARATOR).enumerate() {
        match segment {
            "" => return Err(KeyError::EmptySegment { position }),
            SINGLE_WILDCARD => pattern = true,
            MULTI_WILDCARD if position == last => pattern = true,
            MULTI_WILDCARD => return Err(KeyError::MisplacedWildcard { position }),
            literal => {
                for ch in literal.chars() {
                    if ch == '*' {
                        return Err(KeyError::MisplacedWildcard { position });
                    }
                    if !is_allowed(ch) {
                        return Err(KeyError::InvalidCharacter { ch });
                    }
                }
            }
        }
    }

    Ok(pattern)
}

fn is_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | ':' | '@')
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text.cmp(&other.text)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&self.text).finish()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<String> for Key {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<&str> for Key {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.text
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.text
    }
}
