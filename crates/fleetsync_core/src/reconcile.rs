//! Namespace-wide consistency checks.

use crate::index::IndexEngine;
use crate::model::{Application, Config, Node, ReferenceKind, Secret};
use crate::selector::Selector;
use fleetsync_store::Version;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A disagreement between records, or between records and the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inconsistency {
    /// An application references a record that does not exist.
    DanglingReference {
        /// Application name.
        app: String,
        /// Kind of the missing record.
        kind: ReferenceKind,
        /// Name of the missing record.
        name: String,
    },
    /// An application pins an older version than the record's current one.
    StaleReference {
        /// Application name.
        app: String,
        /// Kind of the record.
        kind: ReferenceKind,
        /// Name of the record.
        name: String,
        /// Version the application pins.
        pinned: Version,
        /// Current version of the record.
        current: Version,
    },
    /// An application's selector does not parse.
    InvalidSelector {
        /// Application name.
        app: String,
        /// Parse error.
        reason: String,
    },
    /// A node's desire names an application that does not exist.
    OrphanedDesire {
        /// Node name.
        node: String,
        /// Application name.
        app: String,
    },
    /// A node holds an application its selector no longer matches.
    UnexpectedPlacement {
        /// Node name.
        node: String,
        /// Application name.
        app: String,
    },
    /// A node matches an application's selector but does not hold it.
    MissingPlacement {
        /// Node name.
        node: String,
        /// Application name.
        app: String,
    },
    /// A node holds an older or newer version than the application's current one.
    VersionMismatch {
        /// Node name.
        node: String,
        /// Application name.
        app: String,
        /// Version in the node's desire.
        desired: Version,
        /// Current application version.
        current: Version,
    },
    /// The index and node desires disagree on where an application runs.
    IndexMismatch {
        /// Application name.
        app: String,
        /// Nodes the index lists.
        indexed: Vec<String>,
        /// Nodes whose desire holds the application.
        assigned: Vec<String>,
    },
    /// The index and application volumes disagree on a record's dependents.
    DependentsMismatch {
        /// Kind of the record.
        kind: ReferenceKind,
        /// Name of the record.
        name: String,
        /// Applications the index lists.
        indexed: Vec<String>,
        /// Applications whose volumes reference it.
        actual: Vec<String>,
    },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::DanglingReference { app, kind, name } => {
                write!(f, "app {app} references missing {kind} {name}")
            }
            Inconsistency::StaleReference {
                app,
                kind,
                name,
                pinned,
                current,
            } => write!(
                f,
                "app {app} pins {kind} {name} at {pinned}, current is {current}"
            ),
            Inconsistency::InvalidSelector { app, reason } => {
                write!(f, "app {app} has an invalid selector: {reason}")
            }
            Inconsistency::OrphanedDesire { node, app } => {
                write!(f, "node {node} desires missing app {app}")
            }
            Inconsistency::UnexpectedPlacement { node, app } => {
                write!(f, "node {node} holds app {app} but does not match its selector")
            }
            Inconsistency::MissingPlacement { node, app } => {
                write!(f, "node {node} matches app {app} but does not hold it")
            }
            Inconsistency::VersionMismatch {
                node,
                app,
                desired,
                current,
            } => write!(
                f,
                "node {node} holds app {app} at {desired}, current is {current}"
            ),
            Inconsistency::IndexMismatch {
                app,
                indexed,
                assigned,
            } => write!(
                f,
                "index places app {app} on [{}], desires say [{}]",
                indexed.join(", "),
                assigned.join(", ")
            ),
            Inconsistency::DependentsMismatch {
                kind,
                name,
                indexed,
                actual,
            } => write!(
                f,
                "index lists [{}] as dependents of {kind} {name}, volumes say [{}]",
                indexed.join(", "),
                actual.join(", ")
            ),
        }
    }
}

/// What a reconciliation pass repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Applications whose stale references were moved forward.
    pub bumped_apps: Vec<String>,
    /// Applications that were re-placed.
    pub synced_apps: Vec<String>,
    /// `(node, app)` desire entries removed because the app no longer exists.
    pub removed_orphans: Vec<(String, String)>,
    /// Nodes whose desire was written.
    pub changed_nodes: BTreeSet<String>,
}

/// Everything a check of one namespace looks at.
pub(crate) struct NamespaceView<'a> {
    pub(crate) nodes: &'a [Node],
    pub(crate) apps: &'a [Application],
    pub(crate) configs: &'a [Config],
    pub(crate) secrets: &'a [Secret],
}

impl NamespaceView<'_> {
    fn current_version(&self, kind: ReferenceKind, name: &str) -> Option<&Version> {
        match kind {
            ReferenceKind::Config => self
                .configs
                .iter()
                .find(|c| c.name == name)
                .map(|c| &c.version),
            ReferenceKind::Secret => self
                .secrets
                .iter()
                .find(|s| s.name == name)
                .map(|s| &s.version),
        }
    }

    /// Compares records against each other and against the index.
    pub(crate) fn check(&self, index: &IndexEngine, namespace: &str) -> Vec<Inconsistency> {
        let mut found = Vec::new();
        let apps: BTreeMap<&str, &Application> =
            self.apps.iter().map(|a| (a.name.as_str(), a)).collect();

        for app in self.apps {
            for (kind, reference) in app.references() {
                match self.current_version(kind, &reference.name) {
                    None => found.push(Inconsistency::DanglingReference {
                        app: app.name.clone(),
                        kind,
                        name: reference.name.clone(),
                    }),
                    Some(current) if current.is_newer_than(&reference.version) => {
                        found.push(Inconsistency::StaleReference {
                            app: app.name.clone(),
                            kind,
                            name: reference.name.clone(),
                            pinned: reference.version.clone(),
                            current: current.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        let selectors: BTreeMap<&str, Option<Selector>> = self
            .apps
            .iter()
            .map(|app| match Selector::parse(&app.selector) {
                Ok(selector) => (app.name.as_str(), Some(selector)),
                Err(err) => {
                    found.push(Inconsistency::InvalidSelector {
                        app: app.name.clone(),
                        reason: err.to_string(),
                    });
                    (app.name.as_str(), None)
                }
            })
            .collect();

        for node in self.nodes {
            let labels = node.selector_labels();
            for entry in node.desire.iter() {
                match apps.get(entry.name.as_str()) {
                    None => found.push(Inconsistency::OrphanedDesire {
                        node: node.name.clone(),
                        app: entry.name.clone(),
                    }),
                    Some(app) if entry.version != app.version => {
                        found.push(Inconsistency::VersionMismatch {
                            node: node.name.clone(),
                            app: app.name.clone(),
                            desired: entry.version.clone(),
                            current: app.version.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
            for (name, selector) in &selectors {
                let Some(selector) = selector else { continue };
                let holds = node.desire.contains(name);
                let matches = selector.matches(&labels);
                if holds && !matches {
                    found.push(Inconsistency::UnexpectedPlacement {
                        node: node.name.clone(),
                        app: (*name).to_string(),
                    });
                } else if matches && !holds {
                    found.push(Inconsistency::MissingPlacement {
                        node: node.name.clone(),
                        app: (*name).to_string(),
                    });
                }
            }
        }

        found.extend(self.check_index(index, namespace));
        found
    }

    fn check_index(&self, index: &IndexEngine, namespace: &str) -> Vec<Inconsistency> {
        let mut found = Vec::new();

        let mut assigned: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in self.nodes {
            for entry in node.desire.iter() {
                assigned
                    .entry(entry.name.clone())
                    .or_default()
                    .push(node.name.clone());
            }
        }
        for nodes in assigned.values_mut() {
            nodes.sort();
            nodes.dedup();
        }
        let indexed: BTreeMap<String, Vec<String>> =
            index.app_assignments(namespace).into_iter().collect();
        for app in assigned.keys().chain(indexed.keys()).collect::<BTreeSet<_>>() {
            let i = indexed.get(app).cloned().unwrap_or_default();
            let a = assigned.get(app).cloned().unwrap_or_default();
            if i != a {
                found.push(Inconsistency::IndexMismatch {
                    app: app.clone(),
                    indexed: i,
                    assigned: a,
                });
            }
        }

        for kind in [ReferenceKind::Config, ReferenceKind::Secret] {
            let mut actual: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for app in self.apps {
                for reference in app.references_of(kind) {
                    actual
                        .entry(reference.name.clone())
                        .or_default()
                        .insert(app.name.clone());
                }
            }
            let indexed: BTreeMap<String, Vec<String>> =
                index.dependents(kind, namespace).into_iter().collect();
            for name in actual.keys().chain(indexed.keys()).collect::<BTreeSet<_>>() {
                let i = indexed.get(name).cloned().unwrap_or_default();
                let a: Vec<String> = actual
                    .get(name)
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default();
                if i != a {
                    found.push(Inconsistency::DependentsMismatch {
                        kind,
                        name: name.clone(),
                        indexed: i,
                        actual: a,
                    });
                }
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Volume;
    use fleetsync_protocol::AppInfo;

    fn app(name: &str, selector: &str, version: u64) -> Application {
        let mut app = Application::new("default", name).with_selector(selector);
        app.version = Version::from_u64(version);
        app
    }

    fn node(name: &str, zone: &str, desire: &[AppInfo]) -> Node {
        let mut node = Node::new("default", name).with_label("zone", zone);
        for entry in desire {
            node.desire.upsert(false, entry.clone());
        }
        node
    }

    #[test]
    fn consistent_namespace_has_no_findings() {
        let mut config = Config::new("default", "settings");
        config.version = Version::from_u64(2);
        let apps = vec![app("web", "zone=a", 3).with_volume(Volume::config("c", "settings", 2u64))];
        let nodes = vec![
            node("edge-1", "a", &[AppInfo::new("web", 3u64)]),
            node("edge-2", "b", &[]),
        ];
        let index = IndexEngine::default();
        index.rebuild("default", &apps, &nodes).unwrap();

        let view = NamespaceView {
            nodes: &nodes,
            apps: &apps,
            configs: &[config],
            secrets: &[],
        };
        assert!(view.check(&index, "default").is_empty());
    }

    #[test]
    fn finds_record_level_problems() {
        let mut config = Config::new("default", "settings");
        config.version = Version::from_u64(4);
        let apps = vec![
            app("web", "zone=a", 3)
                .with_volume(Volume::config("c", "settings", 2u64))
                .with_volume(Volume::secret("s", "gone", 1u64)),
            app("broken", "zone in (", 1),
        ];
        let nodes = vec![
            node("edge-1", "a", &[AppInfo::new("web", 2u64), AppInfo::new("ghost", 1u64)]),
            node("edge-2", "a", &[]),
            node("edge-3", "b", &[AppInfo::new("web", 3u64)]),
        ];
        let index = IndexEngine::default();
        index.rebuild("default", &apps, &nodes).unwrap();

        let view = NamespaceView {
            nodes: &nodes,
            apps: &apps,
            configs: &[config],
            secrets: &[],
        };
        let found = view.check(&index, "default");

        let expected = [
            Inconsistency::StaleReference {
                app: "web".into(),
                kind: ReferenceKind::Config,
                name: "settings".into(),
                pinned: Version::from_u64(2),
                current: Version::from_u64(4),
            },
            Inconsistency::DanglingReference {
                app: "web".into(),
                kind: ReferenceKind::Secret,
                name: "gone".into(),
            },
            Inconsistency::VersionMismatch {
                node: "edge-1".into(),
                app: "web".into(),
                desired: Version::from_u64(2),
                current: Version::from_u64(3),
            },
            Inconsistency::OrphanedDesire {
                node: "edge-1".into(),
                app: "ghost".into(),
            },
            Inconsistency::MissingPlacement {
                node: "edge-2".into(),
                app: "web".into(),
            },
            Inconsistency::UnexpectedPlacement {
                node: "edge-3".into(),
                app: "web".into(),
            },
        ];
        for item in &expected {
            assert!(found.contains(item), "missing {item}");
        }
        assert!(found
            .iter()
            .any(|i| matches!(i, Inconsistency::InvalidSelector { app, .. } if app == "broken")));
        // The rebuilt index agrees with desires.
        assert!(!found
            .iter()
            .any(|i| matches!(i, Inconsistency::IndexMismatch { .. })));
    }

    #[test]
    fn finds_index_drift() {
        let apps = vec![app("web", "zone=a", 1).with_volume(Volume::config("c", "settings", 1u64))];
        let nodes = vec![node("edge-1", "a", &[AppInfo::new("web", 1u64)])];
        let index = IndexEngine::default();
        index.refresh_app_index("default", "web", ["edge-1", "edge-9"]).unwrap();

        let mut config = Config::new("default", "settings");
        config.version = Version::from_u64(1);
        let view = NamespaceView {
            nodes: &nodes,
            apps: &apps,
            configs: &[config],
            secrets: &[],
        };
        let found = view.check(&index, "default");
        assert_eq!(
            found,
            vec![
                Inconsistency::IndexMismatch {
                    app: "web".into(),
                    indexed: vec!["edge-1".into(), "edge-9".into()],
                    assigned: vec!["edge-1".into()],
                },
                Inconsistency::DependentsMismatch {
                    kind: ReferenceKind::Config,
                    name: "settings".into(),
                    indexed: vec![],
                    actual: vec!["web".into()],
                },
            ]
        );
        assert_eq!(
            found[0].to_string(),
            "index places app web on [edge-1, edge-9], desires say [edge-1]"
        );
    }
}
