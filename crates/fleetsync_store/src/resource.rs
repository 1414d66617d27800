//! Resource and store trait definitions.

use crate::error::StoreResult;
use crate::key::{ObjectKey, ResourceKind};
use crate::version::Version;

/// A record that can be kept in a [`ResourceStore`].
pub trait Resource: Clone + Send + Sync + 'static {
    /// The kind every value of this type belongs to.
    const KIND: ResourceKind;

    /// Returns the record's identity.
    fn key(&self) -> ObjectKey;

    /// Returns the version the record was read at.
    fn version(&self) -> &Version;

    /// Overwrites the version. Only stores call this.
    fn set_version(&mut self, version: Version);
}

/// Per-kind record store with optimistic versioning.
///
/// The control plane treats the store as an external collaborator: it owns
/// durability and per-key consistency, the engines own everything else.
///
/// # Invariants
///
/// - `create` stamps [`Version::initial`]
/// - `update` succeeds only if the stored version equals the version carried
///   by the record, and stamps the next version
/// - `list` returns records sorted by name
/// - A failed call leaves the stored record untouched
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For tests and embedded use
pub trait ResourceStore<R: Resource>: Send + Sync {
    /// Reads a record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist.
    fn get(&self, key: &ObjectKey) -> StoreResult<R>;

    /// Creates a record and returns it with its stamped version.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if a record with the same key exists.
    fn create(&self, resource: R) -> StoreResult<R>;

    /// Replaces a record if its stored version matches `resource.version()`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record is gone, `Conflict` if another writer
    /// got there first.
    fn update(&self, resource: R) -> StoreResult<R>;

    /// Deletes a record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist.
    fn delete(&self, key: &ObjectKey) -> StoreResult<()>;

    /// Lists every record in a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn list(&self, namespace: &str) -> StoreResult<Vec<R>>;
}
