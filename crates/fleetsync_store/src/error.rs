//! Error types for store operations.

use crate::key::{ObjectKey, ResourceKind};
use crate::version::Version;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The record does not exist.
    #[error("{kind} {key} not found")]
    NotFound {
        /// Kind of the missing record.
        kind: ResourceKind,
        /// Key of the missing record.
        key: ObjectKey,
    },

    /// A record with the same key already exists.
    #[error("{kind} {key} already exists")]
    AlreadyExists {
        /// Kind of the duplicate record.
        kind: ResourceKind,
        /// Key of the duplicate record.
        key: ObjectKey,
    },

    /// The stored version differs from the one the writer read.
    #[error("version conflict on {kind} {key}: expected {expected}, stored {actual}")]
    Conflict {
        /// Kind of the conflicting record.
        kind: ResourceKind,
        /// Key of the conflicting record.
        key: ObjectKey,
        /// Version the writer based its update on.
        expected: Version,
        /// Version currently stored.
        actual: Version,
    },

    /// The backing store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns true if this is a [`StoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Returns true if this is a [`StoreError::Conflict`].
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let key = ObjectKey::new("default", "cfg");
        let not_found = StoreError::NotFound {
            kind: ResourceKind::Config,
            key: key.clone(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());

        let conflict = StoreError::Conflict {
            kind: ResourceKind::Node,
            key,
            expected: Version::new("3"),
            actual: Version::new("4"),
        };
        assert!(conflict.is_conflict());
    }

    #[test]
    fn display_names_kind_and_key() {
        let err = StoreError::NotFound {
            kind: ResourceKind::Secret,
            key: ObjectKey::new("prod", "registry"),
        };
        assert_eq!(err.to_string(), "secret prod/registry not found");
    }
}
