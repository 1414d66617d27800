//! The control plane facade.

use crate::assign::Assignment;
use crate::cascade::{CascadeEngine, CascadeReport, NodeCleanup};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexEngine;
use crate::model::{Application, Config, Node, ReferenceKind, Secret};
use crate::outcome::{CascadeWarning, Outcome};
use crate::reconcile::{Inconsistency, NamespaceView, ReconcileReport};
use crate::retry::{update_with_retry, Write};
use crate::stores::Stores;
use fleetsync_store::{ObjectKey, Resource, ResourceKind, Version};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry points the API layer calls after each committed mutation, plus the
/// relationship queries.
///
/// Every hook runs after the triggering write has committed. Cascade failures
/// come back as warnings in an [`Outcome`], never as a rollback.
pub struct ControlPlane {
    config: EngineConfig,
    stores: Stores,
    index: Arc<IndexEngine>,
    cascade: CascadeEngine,
}

impl ControlPlane {
    /// Creates a control plane with default configuration.
    ///
    /// The index of each namespace is built from the stores on first use.
    pub fn new(stores: Stores) -> Self {
        Self::with_config(stores, EngineConfig::default())
    }

    /// Creates a control plane with the given configuration.
    pub fn with_config(stores: Stores, config: EngineConfig) -> Self {
        let index = Arc::new(IndexEngine::new(config.index_shards));
        let cascade = CascadeEngine::new(stores.clone(), Arc::clone(&index), &config);
        Self {
            config,
            stores,
            index,
            cascade,
        }
    }

    /// Returns the stores.
    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Returns the index.
    #[must_use]
    pub fn index(&self) -> &IndexEngine {
        &self.index
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Mutation hooks
    // =========================================================================

    /// Called after an application was created or updated.
    ///
    /// Places the application's latest stored version on every matching node,
    /// removes it from nodes that no longer match, and refreshes the index.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSelector` if the selector does not parse (no node is
    /// touched), `NotFound` if the application has since been deleted, or a
    /// store error if the nodes cannot be listed.
    pub fn on_application_write(
        &self,
        app: &Application,
        previous_selector: Option<&str>,
    ) -> CoreResult<Outcome<Assignment>> {
        if let Some(previous) = previous_selector {
            if previous != app.selector {
                info!(
                    app = %app.key(),
                    from = previous,
                    to = %app.selector,
                    "selector changed, migrating placement"
                );
            }
        }
        self.cascade.sync_application(&app.namespace, &app.name)
    }

    /// Called after an application was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the nodes cannot be listed.
    pub fn on_application_delete(&self, app: &Application) -> CoreResult<Outcome<Assignment>> {
        self.cascade.withdraw_application(app)
    }

    /// Called after a configuration was created or updated.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty key; failures on dependents are
    /// warnings.
    pub fn on_config_write(&self, config: &Config) -> CoreResult<Outcome<CascadeReport>> {
        self.cascade
            .propagate(ReferenceKind::Config, &config.key(), &config.version)
    }

    /// Called after a secret was created or updated.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty key; failures on dependents are
    /// warnings.
    pub fn on_secret_write(&self, secret: &Secret) -> CoreResult<Outcome<CascadeReport>> {
        self.cascade
            .propagate(ReferenceKind::Secret, &secret.key(), &secret.version)
    }

    /// Returns true if a configuration or secret may be deleted.
    #[must_use]
    pub fn on_config_or_secret_delete(&self, kind: ReferenceKind, key: &ObjectKey) -> bool {
        self.cascade.can_delete(kind, key)
    }

    /// Deletes a configuration or secret unless something still references it.
    ///
    /// # Errors
    ///
    /// Returns `ReferentialIntegrityViolation` naming the dependents.
    pub fn delete_config_or_secret(&self, kind: ReferenceKind, key: &ObjectKey) -> CoreResult<()> {
        self.cascade.delete_reference(kind, key)
    }

    /// Cleans up after a node whose record the caller already deleted.
    pub fn on_node_delete(&self, node: &Node) -> Outcome<NodeCleanup> {
        self.cascade.cleanup_node(node)
    }

    /// Deletes a node record and cleans up after it.
    ///
    /// A node that does not exist is already clean. Cleanup failures never
    /// fail the delete: they are logged and returned as warnings.
    ///
    /// # Errors
    ///
    /// Returns an error only if the node record itself cannot be read or
    /// deleted.
    pub fn delete_node(&self, namespace: &str, name: &str) -> CoreResult<Outcome<NodeCleanup>> {
        let key = ObjectKey::new(namespace, name);
        if key.is_incomplete() {
            return Err(CoreError::invalid_argument(format!(
                "namespace and name must not be empty (got {key:?})"
            )));
        }

        let node = match self.stores.nodes.get(&key) {
            Ok(node) => node,
            Err(err) if err.is_not_found() => {
                debug!(node = %key, "node already deleted");
                return Ok(Outcome::new(NodeCleanup::default()));
            }
            Err(err) => return Err(err.into()),
        };

        match self.stores.nodes.delete(&key) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
        info!(node = %key, "node deleted");

        Ok(self.cascade.cleanup_node(&node))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns the nodes an application is assigned to, sorted.
    #[must_use]
    pub fn list_nodes_for_app(&self, namespace: &str, app: &str) -> Vec<String> {
        self.warm(namespace);
        self.index.list_nodes_for_app(namespace, app)
    }

    /// Returns the applications referencing a configuration, sorted.
    #[must_use]
    pub fn list_apps_for_config(&self, namespace: &str, config: &str) -> Vec<String> {
        self.warm(namespace);
        self.index.list_apps_for_config(namespace, config)
    }

    /// Returns the applications referencing a secret, sorted.
    #[must_use]
    pub fn list_apps_for_secret(&self, namespace: &str, secret: &str) -> Vec<String> {
        self.warm(namespace);
        self.index.list_apps_for_secret(namespace, secret)
    }

    fn warm(&self, namespace: &str) {
        if namespace.is_empty() {
            return;
        }
        if let Err(err) = self.cascade.ensure_indexed(namespace) {
            warn!(namespace, error = %err, "index not built, answering from what is indexed");
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Rebuilds the index of a namespace from store records.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be listed.
    pub fn rebuild_index(&self, namespace: &str) -> CoreResult<()> {
        self.cascade.rebuild_namespace(namespace)
    }

    /// Repairs a namespace after missed or failed cascades.
    ///
    /// Moves stale references forward, drops desire entries for deleted
    /// applications, rebuilds the index from the cleaned nodes, then re-places
    /// every application.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be listed. Per-record failures
    /// are warnings.
    pub fn reconcile_namespace(&self, namespace: &str) -> CoreResult<Outcome<ReconcileReport>> {
        if namespace.is_empty() {
            return Err(CoreError::invalid_argument("namespace must not be empty"));
        }
        let apps = self.stores.apps.list(namespace)?;
        let nodes = self.stores.nodes.list(namespace)?;
        let configs = self.stores.configs.list(namespace)?;
        let secrets = self.stores.secrets.list(namespace)?;

        let mut outcome = Outcome::new(ReconcileReport::default());

        for app in &apps {
            let mut bumps: Vec<(ReferenceKind, String, Version)> = Vec::new();
            for (kind, reference) in app.references() {
                let current = match kind {
                    ReferenceKind::Config => configs
                        .iter()
                        .find(|c| c.name == reference.name)
                        .map(|c| &c.version),
                    ReferenceKind::Secret => secrets
                        .iter()
                        .find(|s| s.name == reference.name)
                        .map(|s| &s.version),
                };
                if let Some(current) = current {
                    if current.is_newer_than(&reference.version) {
                        bumps.push((kind, reference.name.clone(), current.clone()));
                    }
                }
            }
            if bumps.is_empty() {
                continue;
            }

            let key = app.key();
            let result = update_with_retry(&*self.stores.apps, &key, &self.config.retry, |a| {
                bumps
                    .iter()
                    .fold(false, |changed, (kind, name, version)| {
                        a.bump_reference(*kind, name, version) | changed
                    })
            });
            match result {
                Ok(Write::Updated(_)) => outcome.value.bumped_apps.push(app.name.clone()),
                Ok(Write::Unchanged(_)) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    outcome.warn(CascadeWarning::new(ResourceKind::Application, &key, err));
                }
            }
        }

        let existing: BTreeSet<&str> = apps.iter().map(|a| a.name.as_str()).collect();
        for node in &nodes {
            let orphans: Vec<String> = node
                .desire
                .iter()
                .filter(|e| !existing.contains(e.name.as_str()))
                .map(|e| e.name.clone())
                .filter(|name| self.app_is_gone(namespace, name))
                .collect();
            if orphans.is_empty() {
                continue;
            }

            let key = node.key();
            let result = update_with_retry(&*self.stores.nodes, &key, &self.config.retry, |n| {
                orphans
                    .iter()
                    .fold(false, |changed, name| n.desire.remove(name) | changed)
            });
            match result {
                Ok(write) => {
                    if write.is_updated() {
                        outcome.value.changed_nodes.insert(node.name.clone());
                    }
                    for app in orphans {
                        outcome.value.removed_orphans.push((node.name.clone(), app));
                    }
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => outcome.warn(CascadeWarning::new(ResourceKind::Node, &key, err)),
            }
        }

        self.cascade.rebuild_namespace(namespace)?;

        for app in &apps {
            match self.cascade.sync_application(namespace, &app.name) {
                Ok(placed) => {
                    let placed = outcome.absorb(placed);
                    outcome.value.changed_nodes.extend(placed.changed);
                    outcome.value.synced_apps.push(app.name.clone());
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    outcome.warn(CascadeWarning::new(ResourceKind::Application, &app.key(), err));
                }
            }
        }

        info!(
            namespace,
            bumped = outcome.value.bumped_apps.len(),
            orphans = outcome.value.removed_orphans.len(),
            changed_nodes = outcome.value.changed_nodes.len(),
            failed = outcome.warnings.len(),
            "namespace reconciled"
        );
        Ok(outcome)
    }

    fn app_is_gone(&self, namespace: &str, name: &str) -> bool {
        match self.stores.apps.get(&ObjectKey::new(namespace, name)) {
            Err(err) => err.is_not_found(),
            Ok(_) => false,
        }
    }

    /// Reports every inconsistency in a namespace without repairing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be listed.
    pub fn verify_namespace(&self, namespace: &str) -> CoreResult<Vec<Inconsistency>> {
        self.warm(namespace);
        let nodes = self.stores.nodes.list(namespace)?;
        let apps = self.stores.apps.list(namespace)?;
        let configs = self.stores.configs.list(namespace)?;
        let secrets = self.stores.secrets.list(namespace)?;

        let view = NamespaceView {
            nodes: &nodes,
            apps: &apps,
            configs: &configs,
            secrets: &secrets,
        };
        let found = view.check(&self.index, namespace);
        for inconsistency in &found {
            warn!(namespace, %inconsistency, "inconsistency found");
        }
        Ok(found)
    }
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
