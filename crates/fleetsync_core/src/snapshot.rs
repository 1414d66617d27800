//! Point-in-time fleet snapshots.

use crate::error::CoreResult;
use crate::model::{Application, Config, Node, Secret};
use crate::stores::Stores;
use fleetsync_store::InMemoryStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Every record of a fleet, as loaded from or dumped to a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    /// Node records.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Application records.
    #[serde(default)]
    pub applications: Vec<Application>,
    /// Configuration records.
    #[serde(default)]
    pub configs: Vec<Config>,
    /// Secret records.
    #[serde(default)]
    pub secrets: Vec<Secret>,
}

impl FleetSnapshot {
    /// Reads every record of a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if any store cannot be listed.
    pub fn capture(stores: &Stores, namespace: &str) -> CoreResult<Self> {
        Ok(Self {
            nodes: stores.nodes.list(namespace)?,
            applications: stores.apps.list(namespace)?,
            configs: stores.configs.list(namespace)?,
            secrets: stores.secrets.list(namespace)?,
        })
    }

    /// Loads the snapshot into fresh in-memory stores, keeping record versions.
    pub fn into_stores(self) -> Stores {
        Stores::new(
            Arc::new(InMemoryStore::with_records(self.nodes)),
            Arc::new(InMemoryStore::with_records(self.applications)),
            Arc::new(InMemoryStore::with_records(self.configs)),
            Arc::new(InMemoryStore::with_records(self.secrets)),
        )
    }

    /// Returns every namespace that appears in the snapshot.
    #[must_use]
    pub fn namespaces(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .map(|n| n.namespace.clone())
            .chain(self.applications.iter().map(|a| a.namespace.clone()))
            .chain(self.configs.iter().map(|c| c.namespace.clone()))
            .chain(self.secrets.iter().map(|s| s.namespace.clone()))
            .collect()
    }

    /// Returns true if the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.applications.is_empty()
            && self.configs.is_empty()
            && self.secrets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_store::{ObjectKey, Version};

    #[test]
    fn load_keeps_versions_and_capture_reads_back() {
        let mut app = Application::new("default", "web").with_selector("zone=a");
        app.version = Version::from_u64(7);
        let snapshot = FleetSnapshot {
            nodes: vec![Node::new("default", "edge-1"), Node::new("lab", "edge-9")],
            applications: vec![app],
            configs: vec![Config::new("default", "settings")],
            secrets: Vec::new(),
        };
        assert_eq!(
            snapshot.namespaces().into_iter().collect::<Vec<_>>(),
            vec!["default".to_string(), "lab".to_string()]
        );

        let stores = snapshot.into_stores();
        let web = stores.apps.get(&ObjectKey::new("default", "web")).unwrap();
        assert_eq!(web.version, Version::from_u64(7));
        let settings = stores.configs.get(&ObjectKey::new("default", "settings")).unwrap();
        assert_eq!(settings.version, Version::initial());

        let captured = FleetSnapshot::capture(&stores, "default").unwrap();
        assert_eq!(captured.nodes.len(), 1);
        assert_eq!(captured.applications.len(), 1);
        assert!(!captured.is_empty());
        assert!(FleetSnapshot::default().is_empty());
    }
}
