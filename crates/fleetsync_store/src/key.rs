//! Record identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a namespaced record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace the record lives in.
    pub namespace: String,
    /// Name, unique within the namespace and kind.
    pub name: String,
}

impl ObjectKey {
    /// Creates a new key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns true if either component is empty.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.namespace.is_empty() || self.name.is_empty()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The kinds of record the control plane stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Edge node.
    Node,
    /// Application manifest.
    Application,
    /// Configuration blob.
    Config,
    /// Credential/secret material.
    Secret,
}

impl ResourceKind {
    /// Returns the lowercase name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Node => "node",
            ResourceKind::Application => "application",
            ResourceKind::Config => "config",
            ResourceKind::Secret => "secret",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
