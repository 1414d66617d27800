//! Version tokens stamped on every write.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// An opaque, numerically comparable version token.
///
/// Stores stamp a new token on every successful write. Tokens are carried as
/// strings so that records imported from other systems keep their original
/// values, but ordering is numeric: `"10"` is newer than `"9"`.
///
/// # Invariants
///
/// - Non-numeric and empty tokens rank below every numeric token
/// - Two non-numeric tokens are never newer than one another
/// - `Ord` is consistent with `Eq` (raw string breaks numeric ties)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Creates a version from a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The version stamped on newly created records.
    #[must_use]
    pub fn initial() -> Self {
        Self::from_u64(1)
    }

    /// Creates a version from a number.
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        Self(value.to_string())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the numeric value, if the token is numeric.
    #[must_use]
    pub fn numeric(&self) -> Option<u64> {
        self.0.trim().parse::<u64>().ok()
    }

    /// Returns true if the token carries no value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Returns the token that follows this one.
    ///
    /// Non-numeric tokens restart the sequence at the initial version.
    #[must_use]
    pub fn next(&self) -> Self {
        match self.numeric() {
            Some(n) => Self::from_u64(n.saturating_add(1)),
            None => Self::initial(),
        }
    }

    /// Returns true if `self` is strictly newer than `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: &Version) -> bool {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a > b,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric()
            .cmp(&other.numeric())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}
