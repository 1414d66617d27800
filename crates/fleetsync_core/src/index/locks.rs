//! Striped per-key write locks.

use super::shard::fnv1a;
use fleetsync_store::{ObjectKey, ResourceKind};
use parking_lot::{Mutex, MutexGuard};

/// Serializes writers per key using a fixed set of lock stripes.
///
/// Two keys may share a stripe; holders therefore never take a second lock
/// from the same `KeyedLocks` while holding one.
pub struct KeyedLocks {
    stripes: Vec<Mutex<()>>,
}

impl KeyedLocks {
    /// Creates a lock set with `stripes` stripes (at least one).
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Blocks until the stripe owning `(kind, key)` is free and takes it.
    pub fn lock(&self, kind: ResourceKind, key: &ObjectKey) -> MutexGuard<'_, ()> {
        let salt = kind as u8;
        let idx = (fnv1a(salt, key) % self.stripes.len() as u64) as usize;
        self.stripes[idx].lock()
    }

    /// Returns the number of stripes.
    #[must_use]
    pub fn stripes(&self) -> usize {
        self.stripes.len()
    }
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new(64)
    }
}

impl std::fmt::Debug for KeyedLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedLocks")
            .field("stripes", &self.stripes.len())
            .finish()
    }
}
