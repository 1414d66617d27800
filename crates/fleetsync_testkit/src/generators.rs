//! Property-based test generators using proptest.
//!
//! Labels and selectors draw from small vocabularies so generated selectors
//! actually hit generated nodes.

use crate::fixtures::{TestFleet, TEST_NAMESPACE};
use fleetsync_core::{Application, Config, Volume};
use fleetsync_store::ObjectKey;
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Label keys used by generated nodes and selectors.
pub const LABEL_KEYS: &[&str] = &["zone", "tier", "gpu"];

/// Label values used by generated nodes and selectors.
pub const LABEL_VALUES: &[&str] = &["a", "b", "c"];

/// Strategy for generating a node label set.
pub fn labels_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        prop::sample::select(LABEL_KEYS).prop_map(str::to_string),
        prop::sample::select(LABEL_VALUES).prop_map(str::to_string),
        0..=LABEL_KEYS.len(),
    )
}

/// Strategy for generating a single selector requirement.
pub fn requirement_strategy() -> impl Strategy<Value = String> {
    let key = prop::sample::select(LABEL_KEYS);
    let value = prop::sample::select(LABEL_VALUES);
    let values = prop::sample::subsequence(LABEL_VALUES, 1..=LABEL_VALUES.len());
    prop_oneof![
        (key.clone(), value.clone()).prop_map(|(k, v)| format!("{k}={v}")),
        (key.clone(), value).prop_map(|(k, v)| format!("{k}!={v}")),
        key.clone().prop_map(str::to_string),
        key.clone().prop_map(|k| format!("!{k}")),
        (key.clone(), values.clone()).prop_map(|(k, vs)| format!("{k} in ({})", vs.join(","))),
        (key, values).prop_map(|(k, vs)| format!("{k} notin ({})", vs.join(","))),
    ]
}

/// Strategy for generating a selector string (possibly empty).
pub fn selector_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(requirement_strategy(), 0..3).prop_map(|reqs| reqs.join(","))
}

/// An application in a generated fleet.
#[derive(Debug, Clone)]
pub struct AppPlan {
    /// Selector string.
    pub selector: String,
    /// Index of the configuration it mounts, if any.
    pub config: Option<usize>,
    /// Whether it is a system application.
    pub system: bool,
}

/// A generated fleet: nodes, configurations and applications.
#[derive(Debug, Clone)]
pub struct FleetPlan {
    /// Label set of each node. Node `i` is named `edge-i`.
    pub nodes: Vec<BTreeMap<String, String>>,
    /// Number of configurations. Configuration `i` is named `config-i`.
    pub configs: usize,
    /// Applications. Application `i` is named `app-i`.
    pub apps: Vec<AppPlan>,
}

impl FleetPlan {
    /// Name of node `i`.
    pub fn node_name(i: usize) -> String {
        format!("edge-{i}")
    }

    /// Name of configuration `i`.
    pub fn config_name(i: usize) -> String {
        format!("config-{i}")
    }

    /// Name of application `i`.
    pub fn app_name(i: usize) -> String {
        format!("app-{i}")
    }

    /// Materializes the plan through the control plane hooks.
    pub fn build(&self) -> TestFleet {
        let fleet = TestFleet::new();
        for (i, labels) in self.nodes.iter().enumerate() {
            let labels: Vec<(&str, &str)> = labels
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            fleet.add_node(&Self::node_name(i), &labels);
        }
        let configs: Vec<Config> = (0..self.configs)
            .map(|i| fleet.add_config(Config::new(TEST_NAMESPACE, Self::config_name(i))))
            .collect();
        for (i, plan) in self.apps.iter().enumerate() {
            let mut app = Application::new(TEST_NAMESPACE, Self::app_name(i))
                .with_selector(plan.selector.clone());
            if plan.system {
                app = app.as_system();
            }
            if let Some(config) = plan.config.and_then(|c| configs.get(c)) {
                app = app.with_volume(Volume::config("conf", &config.name, config.version.clone()));
            }
            let _ = fleet.put_app(app);
        }
        fleet
    }
}

/// Strategy for generating a fleet plan.
pub fn fleet_plan_strategy() -> impl Strategy<Value = FleetPlan> {
    (
        prop::collection::vec(labels_strategy(), 1..6),
        0usize..3,
        prop::collection::vec(
            (selector_strategy(), prop::option::of(0usize..3), any::<bool>()),
            0..5,
        ),
    )
        .prop_map(|(nodes, configs, apps)| FleetPlan {
            nodes,
            configs,
            apps: apps
                .into_iter()
                .map(|(selector, config, system)| AppPlan {
                    selector,
                    config: config.filter(|c| *c < configs),
                    system,
                })
                .collect(),
        })
}

/// A mutation applied to a generated fleet.
///
/// Indexes are taken modulo the plan's sizes, so any op applies to any plan.
#[derive(Debug, Clone)]
pub enum FleetOp {
    /// Replace a node's labels, then re-run placement.
    Relabel {
        /// Node index.
        node: usize,
        /// New labels.
        labels: BTreeMap<String, String>,
    },
    /// Change an application's selector.
    Retarget {
        /// Application index.
        app: usize,
        /// New selector.
        selector: String,
    },
    /// Write a configuration (bumping its version).
    TouchConfig {
        /// Configuration index.
        config: usize,
    },
    /// Delete an application.
    DeleteApp {
        /// Application index.
        app: usize,
    },
    /// Delete a node.
    DeleteNode {
        /// Node index.
        node: usize,
    },
}

impl FleetOp {
    /// Applies the op. Ops naming records that no longer exist are no-ops.
    pub fn apply(&self, fleet: &TestFleet, plan: &FleetPlan) {
        let exists_node = |name: &str| fleet.stores().nodes.get(&key(name)).is_ok();
        let exists_app = |name: &str| fleet.stores().apps.get(&key(name)).is_ok();

        match self {
            FleetOp::Relabel { node, labels } => {
                let name = FleetPlan::node_name(node % plan.nodes.len().max(1));
                if exists_node(&name) {
                    let labels: Vec<(&str, &str)> = labels
                        .iter()
                        .map(|(k, v)| (k.as_str(), v.as_str()))
                        .collect();
                    fleet.relabel_node(&name, &labels);
                    fleet.resync();
                }
            }
            FleetOp::Retarget { app, selector } => {
                if plan.apps.is_empty() {
                    return;
                }
                let name = FleetPlan::app_name(app % plan.apps.len());
                if exists_app(&name) {
                    let mut next = fleet.app(&name);
                    next.selector = selector.clone();
                    let _ = fleet.put_app(next);
                }
            }
            FleetOp::TouchConfig { config } => {
                if plan.configs == 0 {
                    return;
                }
                let name = FleetPlan::config_name(config % plan.configs);
                let version = fleet.stores().configs.get(&key(&name)).map(|c| c.version);
                if let Ok(version) = version {
                    let _ = fleet.update_config(&name, "rev", &version.to_string());
                }
            }
            FleetOp::DeleteApp { app } => {
                if plan.apps.is_empty() {
                    return;
                }
                let name = FleetPlan::app_name(app % plan.apps.len());
                if exists_app(&name) {
                    let _ = fleet.delete_app(&name);
                }
            }
            FleetOp::DeleteNode { node } => {
                let name = FleetPlan::node_name(node % plan.nodes.len().max(1));
                let _ = fleet.delete_node(&name);
            }
        }
    }
}

fn key(name: &str) -> ObjectKey {
    ObjectKey::new(TEST_NAMESPACE, name)
}

/// Strategy for generating a fleet op.
pub fn fleet_op_strategy() -> impl Strategy<Value = FleetOp> {
    prop_oneof![
        3 => (0usize..8, labels_strategy())
            .prop_map(|(node, labels)| FleetOp::Relabel { node, labels }),
        3 => (0usize..8, selector_strategy())
            .prop_map(|(app, selector)| FleetOp::Retarget { app, selector }),
        3 => (0usize..4).prop_map(|config| FleetOp::TouchConfig { config }),
        1 => (0usize..8).prop_map(|app| FleetOp::DeleteApp { app }),
        1 => (0usize..8).prop_map(|node| FleetOp::DeleteNode { node }),
    ]
}
