//! Bounded retry for optimistic read-modify-write cycles.

use crate::error::{CoreError, CoreResult};
use fleetsync_store::{ObjectKey, Resource, ResourceStore};
use std::time::Duration;
use tracing::debug;

/// Retry policy for version conflicts.
///
/// Attempt `n > 0` waits `base_delay * 2^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Wait before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single wait.
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Creates a policy with `max_attempts` attempts and the default waits.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(250),
        }
    }

    /// Creates a policy that never retries.
    pub fn no_retry() -> Self {
        Self::immediate(1)
    }

    /// Creates a policy that retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Sets the wait before the first retry.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the upper bound on any single wait.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Returns the wait before `attempt` (0-indexed; the first attempt never waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(retry) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    /// One retry after the first attempt.
    fn default() -> Self {
        Self::new(2)
    }
}

/// Runs `op` until it stops failing with a version conflict.
///
/// `op` receives the 0-indexed attempt number. Non-conflict errors are
/// returned immediately. When every attempt conflicts, the final
/// [`CoreError::Conflict`] carries the number of attempts made.
///
/// # Errors
///
/// Returns the first non-conflict error, or the last conflict.
pub fn retry_on_conflict<T>(
    config: &RetryConfig,
    mut op: impl FnMut(u32) -> CoreResult<T>,
) -> CoreResult<T> {
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let delay = config.delay_for_attempt(attempt);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        match op(attempt) {
            Err(CoreError::Conflict { kind, key, .. }) if attempt + 1 < attempts => {
                debug!(%kind, %key, attempt, "version conflict, retrying");
                attempt += 1;
            }
            Err(CoreError::Conflict { kind, key, .. }) => {
                return Err(CoreError::Conflict {
                    kind,
                    key,
                    attempts,
                });
            }
            other => return other,
        }
    }
}

/// Result of [`update_with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write<R> {
    /// The record was written; holds the stored record with its new version.
    Updated(R),
    /// The mutation was a no-op; holds the record as read.
    Unchanged(R),
}

impl<R> Write<R> {
    /// Returns true if a write happened.
    #[must_use]
    pub fn is_updated(&self) -> bool {
        matches!(self, Write::Updated(_))
    }

    /// Returns the record.
    pub fn into_inner(self) -> R {
        match self {
            Write::Updated(r) | Write::Unchanged(r) => r,
        }
    }

    /// Borrows the record.
    pub fn record(&self) -> &R {
        match self {
            Write::Updated(r) | Write::Unchanged(r) => r,
        }
    }
}

/// Reads `key`, applies `mutate`, and writes the record back, retrying on
/// version conflicts.
///
/// `mutate` sees a fresh read on every attempt and returns whether it
/// changed anything; `false` skips the write.
///
/// # Errors
///
/// Returns `NotFound` if the record is gone, `Conflict` if every attempt lost
/// the race, or any other store error.
pub fn update_with_retry<R: Resource>(
    store: &dyn ResourceStore<R>,
    key: &ObjectKey,
    config: &RetryConfig,
    mut mutate: impl FnMut(&mut R) -> bool,
) -> CoreResult<Write<R>> {
    retry_on_conflict(config, |_| {
        let mut current = store.get(key)?;
        if !mutate(&mut current) {
            return Ok(Write::Unchanged(current));
        }
        Ok(Write::Updated(store.update(current)?))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_store::{InMemoryStore, ResourceKind, StoreError, StoreResult, Version};
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        key: ObjectKey,
        version: Version,
        value: u32,
    }

    impl Resource for Counter {
        const KIND: ResourceKind = ResourceKind::Config;

        fn key(&self) -> ObjectKey {
            self.key.clone()
        }

        fn version(&self) -> &Version {
            &self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }
    }

    fn counter() -> Counter {
        Counter {
            key: ObjectKey::new("default", "c"),
            version: Version::default(),
            value: 0,
        }
    }

    /// Store that bumps the record behind the caller's back a fixed number of times.
    struct RacingStore {
        inner: InMemoryStore<Counter>,
        races_left: Mutex<u32>,
    }

    impl ResourceStore<Counter> for RacingStore {
        fn get(&self, key: &ObjectKey) -> StoreResult<Counter> {
            let read = self.inner.get(key)?;
            let mut races = self.races_left.lock();
            if *races > 0 {
                *races -= 1;
                let mut concurrent = read.clone();
                concurrent.value += 100;
                self.inner.update(concurrent)?;
            }
            Ok(read)
        }

        fn create(&self, resource: Counter) -> StoreResult<Counter> {
            self.inner.create(resource)
        }

        fn update(&self, resource: Counter) -> StoreResult<Counter> {
            self.inner.update(resource)
        }

        fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
            self.inner.delete(key)
        }

        fn list(&self, namespace: &str) -> StoreResult<Vec<Counter>> {
            self.inner.list(namespace)
        }
    }

    fn racing(races: u32) -> RacingStore {
        let inner = InMemoryStore::new();
        inner.create(counter()).unwrap();
        RacingStore {
            inner,
            races_left: Mutex::new(races),
        }
    }

    #[test]
    fn delay_schedule() {
        let config = RetryConfig::new(5)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300));
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(300));
        assert_eq!(config.delay_for_attempt(40), Duration::from_millis(300));
        assert_eq!(RetryConfig::no_retry().delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn update_survives_one_race() {
        let store = racing(1);
        let key = ObjectKey::new("default", "c");
        let write = update_with_retry(&store, &key, &RetryConfig::immediate(2), |c| {
            c.value += 1;
            true
        })
        .unwrap();

        assert!(write.is_updated());
        // The concurrent +100 is preserved, our +1 lands on top of it.
        assert_eq!(write.record().value, 101);
    }

    #[test]
    fn conflict_surfaces_after_attempts_exhausted() {
        let store = racing(5);
        let key = ObjectKey::new("default", "c");
        let err = update_with_retry(&store, &key, &RetryConfig::immediate(2), |c| {
            c.value += 1;
            true
        })
        .unwrap_err();

        assert_eq!(
            err,
            CoreError::Conflict {
                kind: ResourceKind::Config,
                key,
                attempts: 2,
            }
        );
    }

    #[test]
    fn noop_mutation_skips_write() {
        let store = racing(0);
        let key = ObjectKey::new("default", "c");
        let write = update_with_retry(&store, &key, &RetryConfig::default(), |_| false).unwrap();
        assert!(!write.is_updated());
        assert_eq!(store.get(&key).unwrap().version, Version::initial());
    }

    #[test]
    fn other_errors_are_not_retried() {
        let mut calls = 0;
        let result: CoreResult<()> = retry_on_conflict(&RetryConfig::immediate(5), |_| {
            calls += 1;
            Err(StoreError::Unavailable("down".into()).into())
        });
        assert!(matches!(result, Err(CoreError::Store(_))));
        assert_eq!(calls, 1);
    }
}
