//! In-memory resource store.

use crate::error::{StoreError, StoreResult};
use crate::key::ObjectKey;
use crate::resource::{Resource, ResourceStore};
use crate::version::Version;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory resource store.
///
/// This store keeps all records in memory and is suitable for:
/// - Unit and integration tests
/// - The CLI, which loads fleet snapshots from disk
/// - Embedding the control plane in front of a store that is replicated elsewhere
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads. Every call
/// takes the lock once, so each operation is atomic per key.
#[derive(Debug)]
pub struct InMemoryStore<R> {
    records: RwLock<BTreeMap<ObjectKey, R>>,
}

impl<R: Resource> InMemoryStore<R> {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Inserts records as-is, keeping their versions.
    ///
    /// Records without a version get [`Version::initial`]. Useful for loading
    /// snapshots and for tests.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let map = records
            .into_iter()
            .map(|mut r| {
                if r.version().is_empty() {
                    r.set_version(Version::initial());
                }
                (r.key(), r)
            })
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }

    /// Returns the number of records across all namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns every namespace that holds at least one record.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .records
            .read()
            .keys()
            .map(|k| k.namespace.clone())
            .collect();
        out.dedup();
        out
    }
}

impl<R: Resource> Default for InMemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> ResourceStore<R> for InMemoryStore<R> {
    fn get(&self, key: &ObjectKey) -> StoreResult<R> {
        self.records
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: R::KIND,
                key: key.clone(),
            })
    }

    fn create(&self, mut resource: R) -> StoreResult<R> {
        let key = resource.key();
        let mut records = self.records.write();
        if records.contains_key(&key) {
            return Err(StoreError::AlreadyExists { kind: R::KIND, key });
        }
        resource.set_version(Version::initial());
        records.insert(key, resource.clone());
        Ok(resource)
    }

    fn update(&self, mut resource: R) -> StoreResult<R> {
        let key = resource.key();
        let mut records = self.records.write();
        let stored = records.get(&key).ok_or_else(|| StoreError::NotFound {
            kind: R::KIND,
            key: key.clone(),
        })?;

        if stored.version() != resource.version() {
            return Err(StoreError::Conflict {
                kind: R::KIND,
                key,
                expected: resource.version().clone(),
                actual: stored.version().clone(),
            });
        }

        let next = stored.version().next();
        resource.set_version(next);
        records.insert(key, resource.clone());
        Ok(resource)
    }

    fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        self.records
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: R::KIND,
                key: key.clone(),
            })
    }

    fn list(&self, namespace: &str) -> StoreResult<Vec<R>> {
        // BTreeMap order is (namespace, name), so the range is already sorted by name.
        Ok(self
            .records
            .read()
            .iter()
            .filter(|(k, _)| k.namespace == namespace)
            .map(|(_, r)| r.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ResourceKind;

    #[derive(Debug, Clone, PartialEq)]
    struct Doc {
        key: ObjectKey,
        version: Version,
        body: String,
    }

    impl Doc {
        fn new(ns: &str, name: &str, body: &str) -> Self {
            Self {
                key: ObjectKey::new(ns, name),
                version: Version::default(),
                body: body.to_string(),
            }
        }
    }

    impl Resource for Doc {
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

    #[test]
    fn create_stamps_initial_version() {
        let store = InMemoryStore::new();
        let doc = store.create(Doc::new("ns", "a", "x")).unwrap();
        assert_eq!(doc.version, Version::initial());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn create_duplicate_fails() {
        let store = InMemoryStore::new();
        store.create(Doc::new("ns", "a", "x")).unwrap();
        let err = store.create(Doc::new("ns", "a", "y")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[test]
    fn update_bumps_version() {
        let store = InMemoryStore::new();
        let mut doc = store.create(Doc::new("ns", "a", "x")).unwrap();
        doc.body = "y".into();
        let doc = store.update(doc).unwrap();
        assert_eq!(doc.version.as_str(), "2");
        assert_eq!(store.get(&doc.key).unwrap().body, "y");
    }

    #[test]
    fn stale_update_conflicts() {
        let store = InMemoryStore::new();
        let original = store.create(Doc::new("ns", "a", "x")).unwrap();

        let mut first = original.clone();
        first.body = "first".into();
        store.update(first).unwrap();

        let mut second = original;
        second.body = "second".into();
        let err = store.update(second).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.get(&ObjectKey::new("ns", "a")).unwrap().body, "first");
    }

    #[test]
    fn update_missing_is_not_found() {
        let store: InMemoryStore<Doc> = InMemoryStore::new();
        let err = store.update(Doc::new("ns", "ghost", "x")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn delete_and_get() {
        let store = InMemoryStore::new();
        store.create(Doc::new("ns", "a", "x")).unwrap();
        let key = ObjectKey::new("ns", "a");
        store.delete(&key).unwrap();
        assert!(store.get(&key).unwrap_err().is_not_found());
        assert!(store.delete(&key).unwrap_err().is_not_found());
    }

    #[test]
    fn list_is_namespace_scoped_and_sorted() {
        let store = InMemoryStore::new();
        store.create(Doc::new("ns", "b", "x")).unwrap();
        store.create(Doc::new("other", "c", "x")).unwrap();
        store.create(Doc::new("ns", "a", "x")).unwrap();

        let names: Vec<_> = store
            .list("ns")
            .unwrap()
            .into_iter()
            .map(|d| d.key.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.namespaces(), vec!["ns", "other"]);
    }

    #[test]
    fn with_records_keeps_versions() {
        let mut doc = Doc::new("ns", "a", "x");
        doc.version = Version::new("7");
        let store = InMemoryStore::with_records(vec![doc, Doc::new("ns", "b", "y")]);
        assert_eq!(store.get(&ObjectKey::new("ns", "a")).unwrap().version.as_str(), "7");
        assert_eq!(store.get(&ObjectKey::new("ns", "b")).unwrap().version, Version::initial());
    }
}
