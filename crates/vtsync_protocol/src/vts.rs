//! Per-key logical clock.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A logical clock value.
///
/// Every revision the server accepts for a key carries a strictly greater
/// `Vts` than the revisions before it. `Vts::ZERO` means no revision has
/// been observed yet.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Vts(u64);

impl Vts {
    /// The clock before any revision.
    pub const ZERO: Vts = Vts(0);

    /// Creates a clock value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw clock value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the following clock value.
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns true if no revision has been observed.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Vts {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Vts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vts:{}", self.0)
    }
}
