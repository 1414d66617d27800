//! Cascading consistency: version propagation, delete guards and node cleanup.
//!
//! # Locking
//!
//! Locks are always taken in this order:
//!
//! 1. The rebuild gate: every entry point holds it shared, a namespace
//!    rebuild holds it exclusively
//! 2. Reference locks (one per configuration/secret key), held for a whole
//!    propagation or delete check
//! 3. Application locks, held while an application's placement and index
//!    entries are rewritten
//!
//! No code path takes a reference lock while holding an application lock,
//! and entry points never call each other.
//!
//! A namespace is rebuilt from the stores the first time any entry point
//! touches it, so a fresh engine over populated stores never answers from an
//! empty index.
//!
//! The delete guard and application writes are not linearizable: an
//! application created between the guard's check and the store delete can
//! end up with a dangling reference. [`crate::ControlPlane::verify_namespace`]
//! reports such references.

use crate::assign::{Assignment, AssignmentEngine};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexEngine, KeyedLocks};
use crate::model::{Application, Node, ReferenceKind};
use crate::outcome::{CascadeWarning, Outcome};
use crate::retry::{update_with_retry, RetryConfig, Write};
use crate::selector::Selector;
use crate::stores::Stores;
use fleetsync_protocol::AppInfo;
use fleetsync_store::{ObjectKey, Resource, ResourceKind, Version};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a version propagation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Dependents whose reference moved, at their new version.
    pub updated: Vec<AppInfo>,
    /// Dependents already at or past the propagated version.
    pub unchanged: Vec<String>,
    /// Index entries naming applications that no longer exist.
    pub stale: Vec<String>,
    /// Nodes whose desire was written.
    pub nodes: BTreeSet<String>,
}

/// What a node-deletion cleanup did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeCleanup {
    /// Node-owned applications that were deleted.
    pub deleted_apps: Vec<String>,
    /// Node-owned configurations that were deleted.
    pub deleted_configs: Vec<String>,
    /// Node-owned secrets that were deleted.
    pub deleted_secrets: Vec<String>,
    /// Shared applications the node was only detached from.
    pub detached_apps: Vec<String>,
}

/// Keeps applications, node desires and the index consistent with writes to
/// the records they depend on.
pub struct CascadeEngine {
    stores: Stores,
    index: Arc<IndexEngine>,
    assignment: AssignmentEngine,
    retry: RetryConfig,
    gate: RwLock<()>,
    app_locks: KeyedLocks,
    ref_locks: KeyedLocks,
}

impl CascadeEngine {
    /// Creates a new cascade engine.
    pub fn new(stores: Stores, index: Arc<IndexEngine>, config: &EngineConfig) -> Self {
        Self {
            assignment: AssignmentEngine::new(stores.clone(), config.retry.clone()),
            stores,
            index,
            retry: config.retry.clone(),
            gate: RwLock::new(()),
            app_locks: KeyedLocks::new(config.lock_stripes),
            ref_locks: KeyedLocks::new(config.lock_stripes),
        }
    }

    /// Returns the index this engine maintains.
    #[must_use]
    pub fn index(&self) -> &IndexEngine {
        &self.index
    }

    /// Rebuilds a namespace's index from the stores.
    ///
    /// Waits for every in-flight cascade to finish and holds new ones off
    /// until the index is refilled.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty namespace, or an error if the
    /// records cannot be listed.
    pub fn rebuild_namespace(&self, namespace: &str) -> CoreResult<()> {
        let _gate = self.gate.write();
        self.rebuild_exclusive(namespace)
    }

    /// Builds a namespace's index unless it was built before.
    ///
    /// # Errors
    ///
    /// Same as [`Self::rebuild_namespace`].
    pub fn ensure_indexed(&self, namespace: &str) -> CoreResult<()> {
        self.enter(namespace).map(drop)
    }

    fn enter(&self, namespace: &str) -> CoreResult<RwLockReadGuard<'_, ()>> {
        if !self.index.is_built(namespace) {
            let _gate = self.gate.write();
            if !self.index.is_built(namespace) {
                self.rebuild_exclusive(namespace)?;
            }
        }
        Ok(self.gate.read())
    }

    fn rebuild_exclusive(&self, namespace: &str) -> CoreResult<()> {
        if namespace.is_empty() {
            return Err(CoreError::invalid_argument("namespace must not be empty"));
        }
        let apps = self.stores.apps.list(namespace)?;
        let nodes = self.stores.nodes.list(namespace)?;
        self.index.rebuild(namespace, &apps, &nodes)?;
        info!(namespace, apps = apps.len(), nodes = nodes.len(), "index rebuilt");
        Ok(())
    }

    /// Re-derives an application's placement and index entries from its
    /// stored record.
    ///
    /// Always works from the latest stored version, so concurrent callers
    /// for one application converge on the newest record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the application is gone, `InvalidSelector` if
    /// its selector does not parse (its references are still indexed), or an
    /// error if the nodes cannot be listed.
    pub fn sync_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> CoreResult<Outcome<Assignment>> {
        let key = checked(namespace, name)?;
        let _gate = self.enter(namespace)?;
        self.place(&key)
    }

    fn place(&self, key: &ObjectKey) -> CoreResult<Outcome<Assignment>> {
        let _guard = self.app_locks.lock(ResourceKind::Application, key);

        let app = self.stores.apps.get(key)?;
        self.index.refresh_app_references(&app)?;

        let selector = Selector::parse(&app.selector)?;
        let outcome = self.assignment.update_node_app_version(&app, &selector)?;
        self.index.refresh_app_index(
            &key.namespace,
            &key.name,
            outcome.value.assigned.iter().cloned(),
        )?;
        Ok(outcome)
    }

    /// Removes a deleted application from every node and from the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the nodes cannot be listed.
    pub fn withdraw_application(&self, app: &Application) -> CoreResult<Outcome<Assignment>> {
        let key = checked(&app.namespace, &app.name)?;
        let _gate = self.enter(&app.namespace)?;
        self.withdraw(&key, app)
    }

    fn withdraw(&self, key: &ObjectKey, app: &Application) -> CoreResult<Outcome<Assignment>> {
        let _guard = self.app_locks.lock(ResourceKind::Application, key);

        self.index.remove_app(&app.namespace, &app.name)?;
        let outcome = self.assignment.delete_node_app_version(app)?;
        if !outcome.value.assigned.is_empty() {
            // Nodes we failed to write still run it.
            self.index.refresh_app_index(
                &app.namespace,
                &app.name,
                outcome.value.assigned.iter().cloned(),
            )?;
        }
        Ok(outcome)
    }

    /// Moves every dependent of a configuration or secret to `version` and
    /// re-places each dependent that changed.
    ///
    /// A reference never moves backwards: dependents already at or past
    /// `version` are left untouched, which makes replays and out-of-order
    /// events harmless.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty key. Every other failure is a
    /// warning in the outcome.
    pub fn propagate(
        &self,
        kind: ReferenceKind,
        key: &ObjectKey,
        version: &Version,
    ) -> CoreResult<Outcome<CascadeReport>> {
        checked(&key.namespace, &key.name)?;
        let _gate = self.enter(&key.namespace)?;
        let _guard = self.ref_locks.lock(kind.resource_kind(), key);

        let dependents = self.index.list_apps_for(kind, &key.namespace, &key.name);
        debug!(%kind, %key, %version, dependents = dependents.len(), "propagating version");
        let mut outcome = Outcome::new(CascadeReport::default());

        for app_name in dependents {
            let app_key = ObjectKey::new(&key.namespace, &app_name);
            let bumped = update_with_retry(&*self.stores.apps, &app_key, &self.retry, |app| {
                app.bump_reference(kind, &key.name, version)
            });

            let app = match bumped {
                Ok(Write::Updated(app)) => app,
                Ok(Write::Unchanged(_)) => {
                    outcome.value.unchanged.push(app_name);
                    continue;
                }
                Err(err) if err.is_not_found() => {
                    debug!(app = %app_key, "index named a deleted application");
                    outcome.value.stale.push(app_name);
                    continue;
                }
                Err(err) => {
                    outcome.warn(CascadeWarning::new(ResourceKind::Application, &app_key, err));
                    continue;
                }
            };

            info!(
                app = %app_key,
                app_version = %app.version,
                %kind,
                reference = %key.name,
                %version,
                "reference bumped"
            );
            outcome.value.updated.push(app.app_info());

            match self.place(&app_key) {
                Ok(placed) => {
                    let placed = outcome.absorb(placed);
                    outcome.value.nodes.extend(placed.changed);
                }
                Err(err) => {
                    outcome.warn(CascadeWarning::new(ResourceKind::Application, &app_key, err));
                }
            }
        }

        Ok(outcome)
    }

    /// Returns true if a configuration or secret has no dependents.
    #[must_use]
    ///
    /// Answers false when the namespace's index cannot be built.
    pub fn can_delete(&self, kind: ReferenceKind, key: &ObjectKey) -> bool {
        let _gate = match self.enter(&key.namespace) {
            Ok(gate) => gate,
            Err(err) => {
                warn!(%kind, %key, error = %err, "index unavailable, refusing delete");
                return false;
            }
        };
        let _guard = self.ref_locks.lock(kind.resource_kind(), key);
        self.index
            .list_apps_for(kind, &key.namespace, &key.name)
            .is_empty()
    }

    /// Deletes a configuration or secret if nothing references it.
    ///
    /// Deleting a record that is already gone succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ReferentialIntegrityViolation` naming the dependents, or the
    /// store error if the delete itself fails.
    pub fn delete_reference(&self, kind: ReferenceKind, key: &ObjectKey) -> CoreResult<()> {
        checked(&key.namespace, &key.name)?;
        let _gate = self.enter(&key.namespace)?;
        let _guard = self.ref_locks.lock(kind.resource_kind(), key);

        let dependents = self.index.list_apps_for(kind, &key.namespace, &key.name);
        if !dependents.is_empty() {
            return Err(CoreError::ReferentialIntegrityViolation {
                kind: kind.resource_kind(),
                key: key.clone(),
                dependents,
            });
        }

        match self.delete_record(kind, key) {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Cleans up after a node whose record is already deleted.
    ///
    /// Applications owned by the node are deleted along with their
    /// placement; shared applications only lose the node. Configurations and
    /// secrets owned by the node are deleted when nothing else references
    /// them. Nothing here fails the caller: each failed step is logged and
    /// returned as a warning.
    pub fn cleanup_node(&self, node: &Node) -> Outcome<NodeCleanup> {
        let mut outcome = Outcome::new(NodeCleanup::default());
        let _gate = match self.enter(&node.namespace) {
            Ok(gate) => gate,
            Err(err) => {
                outcome.warn(CascadeWarning::new(ResourceKind::Node, &node.key(), err));
                return outcome;
            }
        };

        for entry in node.desire.iter() {
            let app_key = ObjectKey::new(&node.namespace, &entry.name);
            let app = match self.stores.apps.get(&app_key) {
                Ok(app) => app,
                Err(err) if err.is_not_found() => continue,
                Err(err) => {
                    outcome.warn(CascadeWarning::new(ResourceKind::Application, &app_key, err));
                    continue;
                }
            };

            if app.owner.as_deref() != Some(node.name.as_str()) {
                outcome.value.detached_apps.push(app.name);
                continue;
            }

            match self.delete_application(&app) {
                Ok(withdrawn) => {
                    outcome.absorb(withdrawn);
                    outcome.value.deleted_apps.push(app.name);
                }
                Err(err) => {
                    outcome.warn(CascadeWarning::new(ResourceKind::Application, &app_key, err));
                }
            }
        }

        for kind in [ReferenceKind::Config, ReferenceKind::Secret] {
            let owned = match self.owned_by(kind, node) {
                Ok(owned) => owned,
                Err(err) => {
                    let scope = ObjectKey::new(&node.namespace, "*");
                    outcome.warn(CascadeWarning::new(kind.resource_kind(), &scope, err));
                    continue;
                }
            };
            for name in owned {
                let key = ObjectKey::new(&node.namespace, &name);
                match self.delete_owned_reference(kind, &key, &node.name) {
                    Ok(true) => match kind {
                        ReferenceKind::Config => outcome.value.deleted_configs.push(name),
                        ReferenceKind::Secret => outcome.value.deleted_secrets.push(name),
                    },
                    Ok(false) => {}
                    Err(err) => {
                        outcome.warn(CascadeWarning::new(kind.resource_kind(), &key, err));
                    }
                }
            }
        }

        if let Err(err) = self.index.remove_node(&node.namespace, &node.name) {
            outcome.warn(CascadeWarning::new(ResourceKind::Node, &node.key(), err));
        }

        info!(
            node = %node.key(),
            deleted_apps = outcome.value.deleted_apps.len(),
            deleted_configs = outcome.value.deleted_configs.len(),
            deleted_secrets = outcome.value.deleted_secrets.len(),
            failed = outcome.warnings.len(),
            "node cleanup complete"
        );
        outcome
    }

    fn delete_application(&self, app: &Application) -> CoreResult<Outcome<Assignment>> {
        match self.stores.apps.delete(&app.key()) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
        self.withdraw(&app.key(), app)
    }

    fn owned_by(&self, kind: ReferenceKind, node: &Node) -> CoreResult<Vec<String>> {
        let mine = |owner: &Option<String>| owner.as_deref() == Some(node.name.as_str());
        Ok(match kind {
            ReferenceKind::Config => self
                .stores
                .configs
                .list(&node.namespace)?
                .into_iter()
                .filter(|c| mine(&c.owner))
                .map(|c| c.name)
                .collect(),
            ReferenceKind::Secret => self
                .stores
                .secrets
                .list(&node.namespace)?
                .into_iter()
                .filter(|s| mine(&s.owner))
                .map(|s| s.name)
                .collect(),
        })
    }

    /// Deletes a node-owned record that nothing references any more.
    fn delete_owned_reference(
        &self,
        kind: ReferenceKind,
        key: &ObjectKey,
        node: &str,
    ) -> CoreResult<bool> {
        let _guard = self.ref_locks.lock(kind.resource_kind(), key);

        let dependents = self.index.list_apps_for(kind, &key.namespace, &key.name);
        if !dependents.is_empty() {
            debug!(%kind, %key, node, ?dependents, "node-owned record still referenced, keeping");
            return Ok(false);
        }

        match self.delete_record(kind, key) {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn delete_record(&self, kind: ReferenceKind, key: &ObjectKey) -> CoreResult<()> {
        match kind {
            ReferenceKind::Config => self.stores.configs.delete(key)?,
            ReferenceKind::Secret => self.stores.secrets.delete(key)?,
        }
        Ok(())
    }
}

impl std::fmt::Debug for CascadeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeEngine")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn checked(namespace: &str, name: &str) -> CoreResult<ObjectKey> {
    let key = ObjectKey::new(namespace, name);
    if key.is_incomplete() {
        return Err(CoreError::invalid_argument(format!(
            "namespace and name must not be empty (got {key:?})"
        )));
    }
    Ok(key)
}
