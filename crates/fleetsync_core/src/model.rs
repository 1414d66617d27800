//! Control plane data model.
//!
//! Every record is namespaced and carries a [`Version`] stamped by the store.
//! Applications reference configurations and secrets through volumes; each
//! reference pins a version which only ever moves forward.

use fleetsync_protocol::{AppInfo, ReportPayload};
use fleetsync_store::{ObjectKey, Resource, ResourceKind, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label every node implicitly carries, set to its own name.
///
/// Lets an application target one node with `fleetsync.io/node-name=<node>`.
pub const NODE_NAME_LABEL: &str = "fleetsync.io/node-name";

/// The kinds of record a volume can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    /// A [`Config`].
    Config,
    /// A [`Secret`].
    Secret,
}

impl ReferenceKind {
    /// Returns the matching store kind.
    #[must_use]
    pub const fn resource_kind(self) -> ResourceKind {
        match self {
            ReferenceKind::Config => ResourceKind::Config,
            ReferenceKind::Secret => ResourceKind::Secret,
        }
    }
}

impl From<ReferenceKind> for ResourceKind {
    fn from(kind: ReferenceKind) -> Self {
        kind.resource_kind()
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_kind().as_str())
    }
}

/// The desired application lists of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDesire {
    /// Operator-managed system applications.
    #[serde(default)]
    pub system_apps: Vec<AppInfo>,
    /// User applications.
    #[serde(default)]
    pub apps: Vec<AppInfo>,
}

impl NodeDesire {
    /// Returns the list for system or user applications.
    #[must_use]
    pub fn list(&self, system: bool) -> &[AppInfo] {
        if system {
            &self.system_apps
        } else {
            &self.apps
        }
    }

    fn list_mut(&mut self, system: bool) -> &mut Vec<AppInfo> {
        if system {
            &mut self.system_apps
        } else {
            &mut self.apps
        }
    }

    /// Finds an entry by application name in either list.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AppInfo> {
        self.iter().find(|a| a.name == name)
    }

    /// Returns true if either list holds `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over both lists, system applications first.
    pub fn iter(&self) -> impl Iterator<Item = &AppInfo> {
        self.system_apps.iter().chain(self.apps.iter())
    }

    /// Inserts or updates an entry in the chosen list.
    ///
    /// An entry of the same name in the other list is moved over. Returns
    /// true if anything changed.
    pub fn upsert(&mut self, system: bool, info: AppInfo) -> bool {
        let mut changed = false;
        let other = self.list_mut(!system);
        let before = other.len();
        other.retain(|a| a.name != info.name);
        changed |= other.len() != before;

        let list = self.list_mut(system);
        match list.iter().position(|a| a.name == info.name) {
            Some(i) if list[i].version == info.version => {}
            Some(i) => {
                list[i].version = info.version;
                changed = true;
            }
            None => {
                list.push(info);
                changed = true;
            }
        }
        changed
    }

    /// Removes `name` from both lists. Returns true if anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.system_apps.len() + self.apps.len();
        self.system_apps.retain(|a| a.name != name);
        self.apps.retain(|a| a.name != name);
        before != self.system_apps.len() + self.apps.len()
    }

    /// Returns true if both lists are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.system_apps.is_empty() && self.apps.is_empty()
    }
}

/// An edge node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Namespace.
    pub namespace: String,
    /// Name, unique within the namespace.
    pub name: String,
    /// Store-assigned version.
    #[serde(default)]
    pub version: Version,
    /// User labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// What the node should run.
    #[serde(default)]
    pub desire: NodeDesire,
    /// The last report the node sent.
    #[serde(default)]
    pub report: Option<ReportPayload>,
}

impl Node {
    /// Creates a node with no labels and an empty desire.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: Version::default(),
            labels: BTreeMap::new(),
            desire: NodeDesire::default(),
            report: None,
        }
    }

    /// Adds a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Returns the labels selectors are matched against: the user labels plus
    /// [`NODE_NAME_LABEL`].
    #[must_use]
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        labels.insert(NODE_NAME_LABEL.to_string(), self.name.clone());
        labels
    }
}

impl Resource for Node {
    const KIND: ResourceKind = ResourceKind::Node;

    fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

/// A pinned reference to a configuration or secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Name of the referenced record, in the application's namespace.
    pub name: String,
    /// Version the application is pinned to.
    pub version: Version,
}

impl ObjectRef {
    /// Creates a new reference.
    pub fn new(name: impl Into<String>, version: impl Into<Version>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Where a volume's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSource {
    /// A configuration.
    Config(ObjectRef),
    /// A secret.
    Secret(ObjectRef),
    /// A directory on the node.
    HostPath {
        /// Absolute path on the node.
        path: String,
    },
    /// Scratch space, emptied on restart.
    EmptyDir,
}

impl VolumeSource {
    /// Returns the referenced record, if this source is a reference.
    #[must_use]
    pub fn reference(&self) -> Option<(ReferenceKind, &ObjectRef)> {
        match self {
            VolumeSource::Config(r) => Some((ReferenceKind::Config, r)),
            VolumeSource::Secret(r) => Some((ReferenceKind::Secret, r)),
            VolumeSource::HostPath { .. } | VolumeSource::EmptyDir => None,
        }
    }

    fn reference_mut(&mut self) -> Option<(ReferenceKind, &mut ObjectRef)> {
        match self {
            VolumeSource::Config(r) => Some((ReferenceKind::Config, r)),
            VolumeSource::Secret(r) => Some((ReferenceKind::Secret, r)),
            VolumeSource::HostPath { .. } | VolumeSource::EmptyDir => None,
        }
    }
}

/// A named volume mounted into an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name, unique within the application.
    pub name: String,
    /// Content source.
    pub source: VolumeSource,
}

impl Volume {
    /// A volume backed by a configuration.
    pub fn config(
        name: impl Into<String>,
        config: impl Into<String>,
        version: impl Into<Version>,
    ) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::Config(ObjectRef::new(config, version)),
        }
    }

    /// A volume backed by a secret.
    pub fn secret(
        name: impl Into<String>,
        secret: impl Into<String>,
        version: impl Into<Version>,
    ) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::Secret(ObjectRef::new(secret, version)),
        }
    }

    /// A volume backed by a host directory.
    pub fn host_path(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::HostPath { path: path.into() },
        }
    }

    /// A scratch volume.
    pub fn empty_dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::EmptyDir,
        }
    }
}

/// A deployable application manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Namespace.
    pub namespace: String,
    /// Name, unique within the namespace.
    pub name: String,
    /// Store-assigned version. Changes on every write.
    #[serde(default)]
    pub version: Version,
    /// Label selector choosing the nodes to run on. Empty matches nothing.
    #[serde(default)]
    pub selector: String,
    /// Volumes, possibly referencing configurations and secrets.
    #[serde(default)]
    pub volumes: Vec<Volume>,
    /// Whether this is an operator-managed system application.
    #[serde(default)]
    pub system: bool,
    /// Node that owns this application, if it is scoped to one.
    #[serde(default)]
    pub owner: Option<String>,
}

impl Application {
    /// Creates an application with no selector and no volumes.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: Version::default(),
            selector: String::new(),
            volumes: Vec::new(),
            system: false,
            owner: None,
        }
    }

    /// Sets the selector.
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = selector.into();
        self
    }

    /// Adds a volume.
    pub fn with_volume(mut self, volume: Volume) -> Self {
        self.volumes.push(volume);
        self
    }

    /// Marks the application as a system application.
    pub fn as_system(mut self) -> Self {
        self.system = true;
        self
    }

    /// Scopes the application to a node.
    pub fn owned_by(mut self, node: impl Into<String>) -> Self {
        self.owner = Some(node.into());
        self
    }

    /// Returns the entry nodes carry in their desire for this application.
    #[must_use]
    pub fn app_info(&self) -> AppInfo {
        AppInfo::new(&self.name, self.version.clone())
    }

    /// Iterates over every configuration and secret reference.
    pub fn references(&self) -> impl Iterator<Item = (ReferenceKind, &ObjectRef)> {
        self.volumes.iter().filter_map(|v| v.source.reference())
    }

    /// Iterates over the references of one kind.
    pub fn references_of(&self, kind: ReferenceKind) -> impl Iterator<Item = &ObjectRef> {
        self.references()
            .filter(move |(k, _)| *k == kind)
            .map(|(_, r)| r)
    }

    /// Moves every reference to `name` of `kind` forward to `version`.
    ///
    /// References already at or past `version` are left alone. Returns true
    /// if any reference moved.
    pub fn bump_reference(&mut self, kind: ReferenceKind, name: &str, version: &Version) -> bool {
        let mut changed = false;
        for volume in &mut self.volumes {
            if let Some((k, r)) = volume.source.reference_mut() {
                if k == kind && r.name == name && version.is_newer_than(&r.version) {
                    r.version = version.clone();
                    changed = true;
                }
            }
        }
        changed
    }
}

impl Resource for Application {
    const KIND: ResourceKind = ResourceKind::Application;

    fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

/// A configuration blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Namespace.
    pub namespace: String,
    /// Name, unique within the namespace.
    pub name: String,
    /// Store-assigned version.
    #[serde(default)]
    pub version: Version,
    /// Key/value content.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    /// Node that owns this configuration, if it is scoped to one.
    #[serde(default)]
    pub owner: Option<String>,
}

impl Config {
    /// Creates an empty configuration.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: Version::default(),
            data: BTreeMap::new(),
            owner: None,
        }
    }

    /// Adds a data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Scopes the configuration to a node.
    pub fn owned_by(mut self, node: impl Into<String>) -> Self {
        self.owner = Some(node.into());
        self
    }
}

impl Resource for Config {
    const KIND: ResourceKind = ResourceKind::Config;

    fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

/// What a secret holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretLabel {
    /// Arbitrary key/value material.
    #[default]
    Generic,
    /// Container registry credentials.
    RegistryCredential,
    /// TLS certificate and key.
    Certificate,
}

/// Credential or key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Namespace.
    pub namespace: String,
    /// Name, unique within the namespace.
    pub name: String,
    /// Store-assigned version.
    #[serde(default)]
    pub version: Version,
    /// Kind of material.
    #[serde(default)]
    pub label: SecretLabel,
    /// Key/value content.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    /// Node that owns this secret, if it is scoped to one.
    #[serde(default)]
    pub owner: Option<String>,
}

impl Secret {
    /// Creates an empty generic secret.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: Version::default(),
            label: SecretLabel::Generic,
            data: BTreeMap::new(),
            owner: None,
        }
    }

    /// Sets the label.
    pub fn with_label(mut self, label: SecretLabel) -> Self {
        self.label = label;
        self
    }

    /// Adds a data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Scopes the secret to a node.
    pub fn owned_by(mut self, node: impl Into<String>) -> Self {
        self.owner = Some(node.into());
        self
    }
}

impl Resource for Secret {
    const KIND: ResourceKind = ResourceKind::Secret;

    fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_labels_include_node_name() {
        let node = Node::new("default", "edge-1").with_label("zone", "a");
        let labels = node.selector_labels();
        assert_eq!(labels.get("zone").map(String::as_str), Some("a"));
        assert_eq!(labels.get(NODE_NAME_LABEL).map(String::as_str), Some("edge-1"));
        assert!(!node.labels.contains_key(NODE_NAME_LABEL));
    }

    #[test]
    fn desire_upsert_and_remove() {
        let mut desire = NodeDesire::default();
        assert!(desire.upsert(false, AppInfo::new("web", 1u64)));
        assert!(!desire.upsert(false, AppInfo::new("web", 1u64)));
        assert!(desire.upsert(false, AppInfo::new("web", 2u64)));
        assert_eq!(desire.apps, vec![AppInfo::new("web", 2u64)]);

        assert!(desire.remove("web"));
        assert!(!desire.remove("web"));
        assert!(desire.is_empty());
    }

    #[test]
    fn desire_upsert_moves_between_lists() {
        let mut desire = NodeDesire::default();
        desire.upsert(false, AppInfo::new("agent", 1u64));
        assert!(desire.upsert(true, AppInfo::new("agent", 1u64)));
        assert!(desire.apps.is_empty());
        assert_eq!(desire.list(true), &[AppInfo::new("agent", 1u64)]);
    }

    #[test]
    fn bump_reference_only_moves_forward() {
        let mut app = Application::new("default", "web")
            .with_volume(Volume::config("conf", "settings", 3u64))
            .with_volume(Volume::secret("creds", "settings", 3u64))
            .with_volume(Volume::empty_dir("tmp"));

        assert!(!app.bump_reference(ReferenceKind::Config, "settings", &Version::from_u64(2)));
        assert!(!app.bump_reference(ReferenceKind::Config, "settings", &Version::from_u64(3)));
        assert!(app.bump_reference(ReferenceKind::Config, "settings", &Version::from_u64(5)));

        let configs: Vec<_> = app.references_of(ReferenceKind::Config).collect();
        assert_eq!(configs, vec![&ObjectRef::new("settings", 5u64)]);
        // Same name, other kind: untouched.
        let secrets: Vec<_> = app.references_of(ReferenceKind::Secret).collect();
        assert_eq!(secrets, vec![&ObjectRef::new("settings", 3u64)]);
    }

    #[test]
    fn records_survive_cbor() {
        let app = Application::new("default", "web")
            .with_selector("zone=a")
            .owned_by("edge-1")
            .with_volume(Volume::host_path("logs", "/var/log"))
            .with_volume(Volume::config("conf", "settings", 1u64));
        let bytes = fleetsync_protocol::encode(&app).unwrap();
        let back: Application = fleetsync_protocol::decode(&bytes).unwrap();
        assert_eq!(back, app);

        let secret = Secret::new("default", "registry").with_label(SecretLabel::RegistryCredential);
        let bytes = fleetsync_protocol::encode(&secret).unwrap();
        let back: Secret = fleetsync_protocol::decode(&bytes).unwrap();
        assert_eq!(back.label, SecretLabel::RegistryCredential);
    }
}
