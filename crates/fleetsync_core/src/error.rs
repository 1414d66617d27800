//! Error types for the control plane engines.

use crate::outcome::CascadeWarning;
use fleetsync_protocol::ProtocolError;
use fleetsync_store::{ObjectKey, ResourceKind, StoreError};
use thiserror::Error;

/// Result type for control plane operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the control plane engines.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A required record does not exist.
    #[error("{kind} {key} not found")]
    NotFound {
        /// Kind of the missing record.
        kind: ResourceKind,
        /// Key of the missing record.
        key: ObjectKey,
    },

    /// A read-modify-write kept losing against concurrent writers.
    #[error("version conflict on {kind} {key} after {attempts} attempt(s)")]
    Conflict {
        /// Kind of the contended record.
        kind: ResourceKind,
        /// Key of the contended record.
        key: ObjectKey,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Deleting the record would leave dangling references.
    #[error("{kind} {key} is still referenced by: {}", .dependents.join(", "))]
    ReferentialIntegrityViolation {
        /// Kind of the referenced record.
        kind: ResourceKind,
        /// Key of the referenced record.
        key: ObjectKey,
        /// Applications that still reference it.
        dependents: Vec<String>,
    },

    /// One or more cascade steps failed after the triggering write committed.
    #[error("propagation incomplete: {} step(s) failed", .failures.len())]
    PropagationFailure {
        /// The failed steps.
        failures: Vec<CascadeWarning>,
    },

    /// A label selector could not be parsed.
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector {
        /// The selector text.
        selector: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other store failure.
    #[error("store error: {0}")]
    Store(StoreError),

    /// Encoding or decoding failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl CoreError {
    /// Create an invalid selector error.
    pub fn invalid_selector(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns true if this is a [`CoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }

    /// Returns true if this is a [`CoreError::Conflict`].
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::Conflict { .. })
    }

    /// Returns true if the caller asked for something that cannot succeed
    /// as requested.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::NotFound { .. }
                | CoreError::ReferentialIntegrityViolation { .. }
                | CoreError::InvalidSelector { .. }
                | CoreError::InvalidArgument(_)
        )
    }

    /// Returns true if repeating the operation later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Conflict { .. } | CoreError::PropagationFailure { .. } => true,
            CoreError::Store(StoreError::Unavailable(_)) => true,
            _ => false,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, key } => CoreError::NotFound { kind, key },
            StoreError::Conflict { kind, key, .. } => CoreError::Conflict {
                kind,
                key,
                attempts: 1,
            },
            other => CoreError::Store(other),
        }
    }
}
