//! Partial-failure reporting for cascades.
//!
//! Cascades run after the triggering write has committed and are never
//! rolled back. A step that fails is logged and recorded as a
//! [`CascadeWarning`]; the next write or reconciliation pass repairs it.

use crate::error::{CoreError, CoreResult};
use fleetsync_store::{ObjectKey, ResourceKind};
use std::fmt;
use tracing::warn;

/// A cascade step that failed and left data behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeWarning {
    /// Kind of the record the step was acting on.
    pub kind: ResourceKind,
    /// Namespace of the record.
    pub namespace: String,
    /// Name of the record.
    pub name: String,
    /// What went wrong.
    pub error: String,
}

impl CascadeWarning {
    /// Creates a warning for a record.
    pub fn new(kind: ResourceKind, key: &ObjectKey, error: impl fmt::Display) -> Self {
        Self {
            kind,
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            error: error.to_string(),
        }
    }
}

impl fmt::Display for CascadeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{}: {}",
            self.kind, self.namespace, self.name, self.error
        )
    }
}

/// The value of a cascade plus any steps that failed along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Outcome<T> {
    /// The result of the steps that succeeded.
    pub value: T,
    /// Steps that failed.
    pub warnings: Vec<CascadeWarning>,
}

impl<T> Outcome<T> {
    /// Creates a clean outcome.
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Records and logs a failed step.
    pub fn warn(&mut self, warning: CascadeWarning) {
        warn!(
            kind = %warning.kind,
            namespace = %warning.namespace,
            name = %warning.name,
            error = %warning.error,
            "cascade step failed, leaving inconsistent data"
        );
        self.warnings.push(warning);
    }

    /// Moves the warnings of a nested outcome into this one and returns its value.
    ///
    /// The nested warnings were already logged when they were recorded.
    pub fn absorb<U>(&mut self, other: Outcome<U>) -> U {
        self.warnings.extend(other.warnings);
        other.value
    }

    /// Returns true if no step failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Maps the value, keeping the warnings.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }

    /// Converts to a plain result, failing if any step failed.
    ///
    /// # Errors
    ///
    /// Returns `PropagationFailure` listing every failed step.
    pub fn into_strict(self) -> CoreResult<T> {
        if self.warnings.is_empty() {
            Ok(self.value)
        } else {
            Err(CoreError::PropagationFailure {
                failures: self.warnings,
            })
        }
    }
}

impl<T: Default> Default for Outcome<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning(name: &str) -> CascadeWarning {
        CascadeWarning::new(
            ResourceKind::Node,
            &ObjectKey::new("default", name),
            "store unavailable",
        )
    }

    #[test]
    fn clean_outcome_is_ok() {
        let outcome = Outcome::new(3);
        assert!(outcome.is_clean());
        assert_eq!(outcome.into_strict().unwrap(), 3);
    }

    #[test]
    fn warnings_make_strict_fail() {
        let mut outcome = Outcome::new(());
        outcome.warn(warning("edge-1"));
        let err = outcome.into_strict().unwrap_err();
        match err {
            CoreError::PropagationFailure { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(
                    failures[0].to_string(),
                    "node default/edge-1: store unavailable"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn absorb_collects_nested_warnings() {
        let mut outer = Outcome::new(Vec::<u32>::new());
        let mut inner = Outcome::new(7u32);
        inner.warn(warning("edge-2"));

        let value = outer.absorb(inner);
        outer.value.push(value);

        assert_eq!(outer.value, vec![7]);
        assert_eq!(outer.warnings.len(), 1);
        assert_eq!(outer.map(|v| v.len()).value, 1);
    }
}
