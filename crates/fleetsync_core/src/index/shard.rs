//! Sharded key → name-set map.

use fleetsync_store::ObjectKey;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// 64-bit FNV-1a over the namespace and name of a key.
pub(crate) fn fnv1a(salt: u8, key: &ObjectKey) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    let salt = [salt];
    let separator = [0xffu8];
    let parts: [&[u8]; 4] = [
        &salt,
        key.namespace.as_bytes(),
        &separator,
        key.name.as_bytes(),
    ];
    for part in parts {
        for b in part {
            h ^= u64::from(*b);
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
    }
    h
}

/// Maps an object key to a set of names, spread over independently locked
/// shards.
///
/// An empty set is never stored: removing the last name drops the entry.
pub(crate) struct ShardedSets {
    shards: Vec<RwLock<HashMap<ObjectKey, BTreeSet<String>>>>,
}

impl ShardedSets {
    /// Creates a map with `shards` shards (at least one).
    pub(crate) fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1))
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
        }
    }

    fn shard(&self, key: &ObjectKey) -> &RwLock<HashMap<ObjectKey, BTreeSet<String>>> {
        let idx = (fnv1a(0, key) % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Returns the names under `key`, sorted.
    pub(crate) fn get(&self, key: &ObjectKey) -> Vec<String> {
        self.shard(key)
            .read()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns true if `key` maps to `name`.
    #[cfg(test)]
    pub(crate) fn contains(&self, key: &ObjectKey, name: &str) -> bool {
        self.shard(key)
            .read()
            .get(key)
            .is_some_and(|set| set.contains(name))
    }

    /// Replaces the whole set under `key`.
    pub(crate) fn replace(&self, key: &ObjectKey, names: BTreeSet<String>) {
        let mut shard = self.shard(key).write();
        if names.is_empty() {
            shard.remove(key);
        } else {
            shard.insert(key.clone(), names);
        }
    }

    /// Adds `name` under `key`.
    pub(crate) fn insert(&self, key: &ObjectKey, name: &str) {
        self.shard(key)
            .write()
            .entry(key.clone())
            .or_default()
            .insert(name.to_string());
    }

    /// Removes `name` from under `key`. Returns true if it was there.
    pub(crate) fn remove(&self, key: &ObjectKey, name: &str) -> bool {
        let mut shard = self.shard(key).write();
        let Some(set) = shard.get_mut(key) else {
            return false;
        };
        let removed = set.remove(name);
        if set.is_empty() {
            shard.remove(key);
        }
        removed
    }

    /// Drops the entry under `key`, returning its names.
    pub(crate) fn take(&self, key: &ObjectKey) -> BTreeSet<String> {
        self.shard(key).write().remove(key).unwrap_or_default()
    }

    /// Removes `name` from every entry in `namespace`.
    pub(crate) fn remove_everywhere(&self, namespace: &str, name: &str) {
        for shard in &self.shards {
            let mut shard = shard.write();
            shard.retain(|key, set| {
                if key.namespace == namespace {
                    set.remove(name);
                }
                !set.is_empty()
            });
        }
    }

    /// Drops every entry in `namespace`.
    pub(crate) fn clear_namespace(&self, namespace: &str) {
        for shard in &self.shards {
            shard.write().retain(|key, _| key.namespace != namespace);
        }
    }

    /// Returns every entry in `namespace`, sorted by key.
    pub(crate) fn entries(&self, namespace: &str) -> Vec<(ObjectKey, BTreeSet<String>)> {
        let mut out: Vec<_> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .iter()
                    .filter(|(key, _)| key.namespace == namespace)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
