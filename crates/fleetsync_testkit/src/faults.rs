//! Fault-injecting stores.
//!
//! [`FaultyStore`] wraps an [`InMemoryStore`] and fails selected calls, so
//! tests can drive the retry, warning and cleanup paths of the engines.

use fleetsync_core::{Application, Config, Node, Secret, Stores};
use fleetsync_store::{
    InMemoryStore, ObjectKey, Resource, ResourceStore, StoreError, StoreResult,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Faults {
    failing_deletes: BTreeSet<String>,
    failing_updates: BTreeSet<String>,
    pending_conflicts: usize,
    unavailable: bool,
    fired: usize,
}

/// A store that fails on demand.
///
/// Faults are keyed by record name, so one store can serve a whole
/// namespace while only the records under test misbehave.
#[derive(Debug)]
pub struct FaultyStore<R: Resource> {
    inner: InMemoryStore<R>,
    faults: Mutex<Faults>,
}

impl<R: Resource> FaultyStore<R> {
    /// Creates an empty store with no faults.
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Makes every delete of `name` fail as unavailable.
    pub fn fail_deletes_of(&self, name: &str) {
        self.faults.lock().failing_deletes.insert(name.to_string());
    }

    /// Makes every update of `name` fail as unavailable.
    pub fn fail_updates_of(&self, name: &str) {
        self.faults.lock().failing_updates.insert(name.to_string());
    }

    /// Makes the next `count` updates fail with a version conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.faults.lock().pending_conflicts += count;
    }

    /// Makes every call fail as unavailable until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unavailable = unavailable;
    }

    /// Clears every fault. The fired counter is kept.
    pub fn heal(&self) {
        let mut faults = self.faults.lock();
        let fired = faults.fired;
        *faults = Faults {
            fired,
            ..Faults::default()
        };
    }

    /// Returns how many faults have fired.
    pub fn fired(&self) -> usize {
        self.faults.lock().fired
    }

    /// Returns the wrapped store, bypassing faults.
    pub fn inner(&self) -> &InMemoryStore<R> {
        &self.inner
    }

    fn check_available(&self) -> StoreResult<()> {
        let mut faults = self.faults.lock();
        if faults.unavailable {
            faults.fired += 1;
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        Ok(())
    }
}

impl<R: Resource> Default for FaultyStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> ResourceStore<R> for FaultyStore<R> {
    fn get(&self, key: &ObjectKey) -> StoreResult<R> {
        self.check_available()?;
        self.inner.get(key)
    }

    fn create(&self, resource: R) -> StoreResult<R> {
        self.check_available()?;
        self.inner.create(resource)
    }

    fn update(&self, resource: R) -> StoreResult<R> {
        self.check_available()?;
        let key = resource.key();
        {
            let mut faults = self.faults.lock();
            if faults.failing_updates.contains(&key.name) {
                faults.fired += 1;
                return Err(StoreError::Unavailable(format!("injected update failure for {key}")));
            }
            if faults.pending_conflicts > 0 {
                faults.pending_conflicts -= 1;
                faults.fired += 1;
                return Err(StoreError::Conflict {
                    kind: R::KIND,
                    key,
                    expected: resource.version().clone(),
                    actual: resource.version().next(),
                });
            }
        }
        self.inner.update(resource)
    }

    fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        self.check_available()?;
        {
            let mut faults = self.faults.lock();
            if faults.failing_deletes.contains(&key.name) {
                faults.fired += 1;
                return Err(StoreError::Unavailable(format!("injected delete failure for {key}")));
            }
        }
        self.inner.delete(key)
    }

    fn list(&self, namespace: &str) -> StoreResult<Vec<R>> {
        self.check_available()?;
        self.inner.list(namespace)
    }
}

/// One faulty store per record kind, with handles kept for steering faults.
#[derive(Debug, Clone, Default)]
pub struct FaultyStores {
    /// Node store.
    pub nodes: Arc<FaultyStore<Node>>,
    /// Application store.
    pub apps: Arc<FaultyStore<Application>>,
    /// Configuration store.
    pub configs: Arc<FaultyStore<Config>>,
    /// Secret store.
    pub secrets: Arc<FaultyStore<Secret>>,
}

impl FaultyStores {
    /// Creates four empty faulty stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stores as the engines see them.
    pub fn stores(&self) -> Stores {
        Stores::new(
            Arc::clone(&self.nodes) as Arc<dyn ResourceStore<Node>>,
            Arc::clone(&self.apps) as Arc<dyn ResourceStore<Application>>,
            Arc::clone(&self.configs) as Arc<dyn ResourceStore<Config>>,
            Arc::clone(&self.secrets) as Arc<dyn ResourceStore<Secret>>,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_store::Version;

    #[test]
    fn targeted_delete_failure() {
        let store = FaultyStore::<Config>::new();
        store.create(Config::new("default", "a")).unwrap();
        store.create(Config::new("default", "b")).unwrap();
        store.fail_deletes_of("a");

        let err = store.delete(&ObjectKey::new("default", "a")).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        store.delete(&ObjectKey::new("default", "b")).unwrap();
        assert_eq!(store.fired(), 1);
        assert_eq!(store.inner().len(), 1);
    }

    #[test]
    fn injected_conflicts_run_out() {
        let store = FaultyStore::<Node>::new();
        let node = store.create(Node::new("default", "edge-1")).unwrap();
        store.inject_conflicts(1);

        let err = store.update(node.clone()).unwrap_err();
        assert!(err.is_conflict());
        let updated = store.update(node).unwrap();
        assert_eq!(updated.version, Version::from_u64(2));
    }

    #[test]
    fn outage_and_heal() {
        let store = FaultyStore::<Secret>::new();
        store.set_unavailable(true);
        assert!(store.list("default").is_err());

        store.heal();
        assert!(store.list("default").unwrap().is_empty());
        assert_eq!(store.fired(), 1);
    }
}
