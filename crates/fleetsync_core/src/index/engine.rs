//! The relationship index.

use super::shard::ShardedSets;
use crate::error::{CoreError, CoreResult};
use crate::model::{Application, Node, ReferenceKind};
use fleetsync_store::ObjectKey;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// Maintains application → nodes and config/secret → applications mappings.
///
/// # Invariants
///
/// - `list_nodes_for_app` reflects the last `refresh_app_index` for that
///   application (callers refresh only after the node writes landed)
/// - `list_apps_for_config(c)` contains `a` iff the last
///   `refresh_app_references(a)` saw a volume referencing `c`
/// - No entry maps to an empty set
///
/// Writers for one application must be serialized by the caller (see
/// [`super::KeyedLocks`]); readers never block on each other across shards.
pub struct IndexEngine {
    app_nodes: ShardedSets,
    config_apps: ShardedSets,
    secret_apps: ShardedSets,
    // Reverse maps so a reference refresh can drop stale edges.
    app_configs: ShardedSets,
    app_secrets: ShardedSets,
    // Namespaces filled by at least one rebuild.
    built: RwLock<BTreeSet<String>>,
}

impl IndexEngine {
    /// Creates an empty index with `shards` shards per map.
    pub fn new(shards: usize) -> Self {
        Self {
            app_nodes: ShardedSets::new(shards),
            config_apps: ShardedSets::new(shards),
            secret_apps: ShardedSets::new(shards),
            app_configs: ShardedSets::new(shards),
            app_secrets: ShardedSets::new(shards),
            built: RwLock::new(BTreeSet::new()),
        }
    }

    /// Returns true once a namespace has been rebuilt from ground truth.
    #[must_use]
    pub fn is_built(&self, namespace: &str) -> bool {
        self.built.read().contains(namespace)
    }

    /// Replaces the node set of an application.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the namespace or name is empty.
    pub fn refresh_app_index<I, S>(&self, namespace: &str, app: &str, nodes: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = checked_key(namespace, app)?;
        let nodes: BTreeSet<String> = nodes.into_iter().map(Into::into).collect();
        trace!(app = %key, nodes = nodes.len(), "refreshing app index");
        self.app_nodes.replace(&key, nodes);
        Ok(())
    }

    /// Returns the nodes an application is assigned to, sorted.
    #[must_use]
    pub fn list_nodes_for_app(&self, namespace: &str, app: &str) -> Vec<String> {
        self.app_nodes.get(&ObjectKey::new(namespace, app))
    }

    /// Returns the applications referencing a configuration, sorted.
    #[must_use]
    pub fn list_apps_for_config(&self, namespace: &str, config: &str) -> Vec<String> {
        self.config_apps.get(&ObjectKey::new(namespace, config))
    }

    /// Returns the applications referencing a secret, sorted.
    #[must_use]
    pub fn list_apps_for_secret(&self, namespace: &str, secret: &str) -> Vec<String> {
        self.secret_apps.get(&ObjectKey::new(namespace, secret))
    }

    /// Returns the applications referencing a configuration or secret.
    #[must_use]
    pub fn list_apps_for(&self, kind: ReferenceKind, namespace: &str, name: &str) -> Vec<String> {
        match kind {
            ReferenceKind::Config => self.list_apps_for_config(namespace, name),
            ReferenceKind::Secret => self.list_apps_for_secret(namespace, name),
        }
    }

    fn maps(&self, kind: ReferenceKind) -> (&ShardedSets, &ShardedSets) {
        match kind {
            ReferenceKind::Config => (&self.config_apps, &self.app_configs),
            ReferenceKind::Secret => (&self.secret_apps, &self.app_secrets),
        }
    }

    /// Re-derives the config/secret edges of an application from its volumes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the application's namespace or name is empty.
    pub fn refresh_app_references(&self, app: &Application) -> CoreResult<()> {
        let key = checked_key(&app.namespace, &app.name)?;
        for kind in [ReferenceKind::Config, ReferenceKind::Secret] {
            let wanted: BTreeSet<String> = app.references_of(kind).map(|r| r.name.clone()).collect();
            self.set_references(kind, &key, wanted);
        }
        Ok(())
    }

    fn set_references(&self, kind: ReferenceKind, app: &ObjectKey, wanted: BTreeSet<String>) {
        let (forward, reverse) = self.maps(kind);
        let previous = reverse.take(app);

        for stale in previous.difference(&wanted) {
            forward.remove(&ObjectKey::new(&app.namespace, stale), &app.name);
        }
        for name in &wanted {
            forward.insert(&ObjectKey::new(&app.namespace, name), &app.name);
        }
        reverse.replace(app, wanted);
    }

    /// Drops every edge of an application.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the namespace or name is empty.
    pub fn remove_app(&self, namespace: &str, app: &str) -> CoreResult<()> {
        let key = checked_key(namespace, app)?;
        self.app_nodes.take(&key);
        for kind in [ReferenceKind::Config, ReferenceKind::Secret] {
            self.set_references(kind, &key, BTreeSet::new());
        }
        debug!(app = %key, "removed app from index");
        Ok(())
    }

    /// Drops a node from every application's node set in its namespace.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the namespace or name is empty.
    pub fn remove_node(&self, namespace: &str, node: &str) -> CoreResult<()> {
        let key = checked_key(namespace, node)?;
        self.app_nodes.remove_everywhere(namespace, node);
        debug!(node = %key, "removed node from index");
        Ok(())
    }

    /// Rebuilds every map of a namespace from ground truth.
    ///
    /// Node sets come from node desires, not selectors: the index never
    /// claims an assignment that has not been written.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `namespace` is empty.
    pub fn rebuild(&self, namespace: &str, apps: &[Application], nodes: &[Node]) -> CoreResult<()> {
        if namespace.is_empty() {
            return Err(CoreError::invalid_argument("namespace must not be empty"));
        }
        for map in [
            &self.app_nodes,
            &self.config_apps,
            &self.secret_apps,
            &self.app_configs,
            &self.app_secrets,
        ] {
            map.clear_namespace(namespace);
        }

        for app in apps.iter().filter(|a| a.namespace == namespace) {
            self.refresh_app_references(app)?;
        }
        for node in nodes.iter().filter(|n| n.namespace == namespace) {
            for entry in node.desire.iter() {
                self.app_nodes
                    .insert(&ObjectKey::new(namespace, &entry.name), &node.name);
            }
        }
        self.built.write().insert(namespace.to_string());
        debug!(
            namespace,
            apps = apps.len(),
            nodes = nodes.len(),
            "rebuilt index"
        );
        Ok(())
    }

    /// Returns every application → nodes entry of a namespace, sorted by app.
    #[must_use]
    pub fn app_assignments(&self, namespace: &str) -> Vec<(String, Vec<String>)> {
        self.app_nodes
            .entries(namespace)
            .into_iter()
            .map(|(key, nodes)| (key.name, nodes.into_iter().collect()))
            .collect()
    }

    /// Returns every config/secret → applications entry of a namespace.
    #[must_use]
    pub fn dependents(&self, kind: ReferenceKind, namespace: &str) -> Vec<(String, Vec<String>)> {
        self.maps(kind)
            .0
            .entries(namespace)
            .into_iter()
            .map(|(key, apps)| (key.name, apps.into_iter().collect()))
            .collect()
    }
}

impl Default for IndexEngine {
    fn default() -> Self {
        Self::new(16)
    }
}

impl std::fmt::Debug for IndexEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexEngine").finish_non_exhaustive()
    }
}

fn checked_key(namespace: &str, name: &str) -> CoreResult<ObjectKey> {
    let key = ObjectKey::new(namespace, name);
    if key.is_incomplete() {
        return Err(CoreError::invalid_argument(format!(
            "namespace and name must not be empty (got {key:?})"
        )));
    }
    Ok(key)
}
