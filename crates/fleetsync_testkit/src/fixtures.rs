//! Test fixtures and fleet helpers.
//!
//! [`TestFleet`] plays the API layer: it writes records to the stores and
//! then calls the matching control plane hook, exactly once per write.

use fleetsync_core::{
    Application, Assignment, CascadeReport, Config, ControlPlane, CoreResult, EngineConfig,
    FleetSnapshot, Inconsistency, Node, NodeCleanup, Outcome, ReferenceKind, Secret, Selector,
    Stores,
};
use fleetsync_protocol::AppInfo;
use fleetsync_store::ObjectKey;
use std::collections::BTreeSet;
use std::io::Write as _;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Namespace every fixture record lives in.
pub const TEST_NAMESPACE: &str = "default";

/// A control plane over its own stores, with API-layer style helpers.
pub struct TestFleet {
    /// The control plane under test.
    pub plane: Arc<ControlPlane>,
}

impl TestFleet {
    /// Creates a fleet over empty in-memory stores.
    pub fn new() -> Self {
        Self::with_stores(Stores::in_memory())
    }

    /// Creates a fleet over the given stores.
    pub fn with_stores(stores: Stores) -> Self {
        Self::with_config(stores, EngineConfig::default())
    }

    /// Creates a fleet with a custom engine configuration.
    pub fn with_config(stores: Stores, config: EngineConfig) -> Self {
        Self {
            plane: Arc::new(ControlPlane::with_config(stores, config)),
        }
    }

    /// Returns the stores.
    pub fn stores(&self) -> &Stores {
        self.plane.stores()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Creates a node with the given labels.
    pub fn add_node(&self, name: &str, labels: &[(&str, &str)]) -> Node {
        let mut node = Node::new(TEST_NAMESPACE, name);
        for (k, v) in labels {
            node = node.with_label(*k, *v);
        }
        self.stores().nodes.create(node).expect("Failed to create node")
    }

    /// Replaces a node's labels. Placement is not re-run; see [`Self::resync`].
    pub fn relabel_node(&self, name: &str, labels: &[(&str, &str)]) -> Node {
        let mut node = self.node(name);
        node.labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.stores().nodes.update(node).expect("Failed to relabel node")
    }

    /// Deletes a node and cleans up after it.
    pub fn delete_node(&self, name: &str) -> Outcome<NodeCleanup> {
        self.plane
            .delete_node(TEST_NAMESPACE, name)
            .expect("Failed to delete node")
    }

    /// Creates or updates an application, then runs placement.
    ///
    /// An update keeps the stored version as the write precondition and
    /// passes the previous selector to the hook.
    pub fn put_app(&self, app: Application) -> (Application, Outcome<Assignment>) {
        let apps = &self.stores().apps;
        let (stored, previous) = match apps.get(&ObjectKey::new(&app.namespace, &app.name)) {
            Ok(existing) => {
                let mut next = app;
                next.version = existing.version.clone();
                let stored = apps.update(next).expect("Failed to update application");
                (stored, Some(existing.selector))
            }
            Err(_) => (
                apps.create(app).expect("Failed to create application"),
                None,
            ),
        };
        let outcome = self
            .plane
            .on_application_write(&stored, previous.as_deref())
            .expect("Placement failed");
        (stored, outcome)
    }

    /// Deletes an application and withdraws it from every node.
    pub fn delete_app(&self, name: &str) -> Outcome<Assignment> {
        let app = self.app(name);
        self.stores()
            .apps
            .delete(&ObjectKey::new(TEST_NAMESPACE, name))
            .expect("Failed to delete application");
        self.plane
            .on_application_delete(&app)
            .expect("Withdrawal failed")
    }

    /// Creates a configuration.
    pub fn add_config(&self, config: Config) -> Config {
        let config = self
            .stores()
            .configs
            .create(config)
            .expect("Failed to create config");
        let _ = self
            .plane
            .on_config_write(&config)
            .expect("Propagation failed");
        config
    }

    /// Sets one data entry of a configuration and propagates the new version.
    pub fn update_config(&self, name: &str, key: &str, value: &str) -> (Config, Outcome<CascadeReport>) {
        let mut config = self
            .stores()
            .configs
            .get(&ObjectKey::new(TEST_NAMESPACE, name))
            .expect("Config not found");
        config.data.insert(key.to_string(), value.to_string());
        let config = self
            .stores()
            .configs
            .update(config)
            .expect("Failed to update config");
        let outcome = self
            .plane
            .on_config_write(&config)
            .expect("Propagation failed");
        (config, outcome)
    }

    /// Creates a secret.
    pub fn add_secret(&self, secret: Secret) -> Secret {
        let secret = self
            .stores()
            .secrets
            .create(secret)
            .expect("Failed to create secret");
        let _ = self
            .plane
            .on_secret_write(&secret)
            .expect("Propagation failed");
        secret
    }

    /// Sets one data entry of a secret and propagates the new version.
    pub fn update_secret(&self, name: &str, key: &str, value: &str) -> (Secret, Outcome<CascadeReport>) {
        let mut secret = self
            .stores()
            .secrets
            .get(&ObjectKey::new(TEST_NAMESPACE, name))
            .expect("Secret not found");
        secret.data.insert(key.to_string(), value.to_string());
        let secret = self
            .stores()
            .secrets
            .update(secret)
            .expect("Failed to update secret");
        let outcome = self
            .plane
            .on_secret_write(&secret)
            .expect("Propagation failed");
        (secret, outcome)
    }

    /// Deletes a configuration or secret through the delete guard.
    pub fn try_delete(&self, kind: ReferenceKind, name: &str) -> CoreResult<()> {
        self.plane
            .delete_config_or_secret(kind, &ObjectKey::new(TEST_NAMESPACE, name))
    }

    /// Re-runs placement for every application, as after node label edits.
    pub fn resync(&self) {
        let apps = self
            .stores()
            .apps
            .list(TEST_NAMESPACE)
            .expect("Failed to list applications");
        for app in apps {
            let _ = self
                .plane
                .on_application_write(&app, None)
                .expect("Placement failed");
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Reads a node.
    pub fn node(&self, name: &str) -> Node {
        self.stores()
            .nodes
            .get(&ObjectKey::new(TEST_NAMESPACE, name))
            .expect("Node not found")
    }

    /// Reads an application.
    pub fn app(&self, name: &str) -> Application {
        self.stores()
            .apps
            .get(&ObjectKey::new(TEST_NAMESPACE, name))
            .expect("Application not found")
    }

    /// Returns a node's desire, system applications first.
    pub fn desire_of(&self, node: &str) -> Vec<AppInfo> {
        self.node(node).desire.iter().cloned().collect()
    }

    /// Returns the indexed nodes of an application.
    pub fn nodes_for(&self, app: &str) -> Vec<String> {
        self.plane.list_nodes_for_app(TEST_NAMESPACE, app)
    }

    /// Returns the indexed dependents of a configuration.
    pub fn apps_for_config(&self, config: &str) -> Vec<String> {
        self.plane.list_apps_for_config(TEST_NAMESPACE, config)
    }

    /// Returns the indexed dependents of a secret.
    pub fn apps_for_secret(&self, secret: &str) -> Vec<String> {
        self.plane.list_apps_for_secret(TEST_NAMESPACE, secret)
    }

    /// Evaluates a selector against the stored nodes directly.
    ///
    /// An unparsable selector matches nothing.
    pub fn matching_nodes(&self, selector: &str) -> BTreeSet<String> {
        let Ok(selector) = Selector::parse(selector) else {
            return BTreeSet::new();
        };
        self.stores()
            .nodes
            .list(TEST_NAMESPACE)
            .expect("Failed to list nodes")
            .into_iter()
            .filter(|n| selector.matches(&n.selector_labels()))
            .map(|n| n.name)
            .collect()
    }

    /// Returns every inconsistency in the namespace.
    pub fn inconsistencies(&self) -> Vec<Inconsistency> {
        self.plane
            .verify_namespace(TEST_NAMESPACE)
            .expect("Verification failed")
    }

    /// Panics if the namespace has any inconsistency.
    pub fn assert_consistent(&self) {
        let found = self.inconsistencies();
        assert!(found.is_empty(), "fleet is inconsistent: {found:#?}");
    }

    /// Captures the namespace as a snapshot.
    pub fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot::capture(self.stores(), TEST_NAMESPACE).expect("Failed to capture snapshot")
    }

    /// Writes the namespace snapshot to a temporary JSON file.
    pub fn write_snapshot(&self) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        serde_json::to_writer_pretty(&mut file, &self.snapshot()).expect("Failed to write snapshot");
        file.flush().expect("Failed to flush snapshot");
        file
    }
}

impl Default for TestFleet {
    fn default() -> Self {
        Self::new()
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use fleetsync_core::Volume;

    /// Three nodes in two zones, and `web` in zone `a` mounting `settings@1`.
    ///
    /// | node   | zone |
    /// |--------|------|
    /// | edge-1 | a    |
    /// | edge-2 | a    |
    /// | edge-3 | b    |
    pub fn two_zone_fleet() -> TestFleet {
        let fleet = TestFleet::new();
        fleet.add_node("edge-1", &[("zone", "a")]);
        fleet.add_node("edge-2", &[("zone", "a")]);
        fleet.add_node("edge-3", &[("zone", "b")]);
        let config = fleet.add_config(Config::new(TEST_NAMESPACE, "settings").with_data("level", "info"));
        let _ = fleet.put_app(
            Application::new(TEST_NAMESPACE, "web")
                .with_selector("zone=a")
                .with_volume(Volume::config("conf", "settings", config.version)),
        );
        fleet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_store::Version;

    #[test]
    fn two_zone_fleet_is_consistent() {
        let fleet = scenarios::two_zone_fleet();
        assert_eq!(fleet.nodes_for("web"), vec!["edge-1", "edge-2"]);
        assert_eq!(fleet.apps_for_config("settings"), vec!["web"]);
        assert_eq!(
            fleet.matching_nodes("zone=a").into_iter().collect::<Vec<_>>(),
            fleet.nodes_for("web")
        );
        fleet.assert_consistent();
    }

    #[test]
    fn put_app_updates_in_place() {
        let fleet = scenarios::two_zone_fleet();
        let (app, outcome) = fleet.put_app(Application::new(TEST_NAMESPACE, "web").with_selector("zone=b"));

        assert_eq!(app.version, Version::from_u64(2));
        assert!(outcome.is_clean());
        assert_eq!(fleet.nodes_for("web"), vec!["edge-3"]);
        assert!(fleet.apps_for_config("settings").is_empty());
    }

    #[test]
    fn written_snapshot_reads_back() {
        let fleet = scenarios::two_zone_fleet();
        let file = fleet.write_snapshot();
        let text = std::fs::read_to_string(file.path()).unwrap();
        let snapshot: FleetSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(snapshot, fleet.snapshot());
        assert_eq!(snapshot.nodes.len(), 3);
    }
}
