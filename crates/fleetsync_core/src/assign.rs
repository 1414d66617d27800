//! Selector-driven placement of applications into node desire.

use crate::error::{CoreError, CoreResult};
use crate::model::{Application, Node};
use crate::outcome::{CascadeWarning, Outcome};
use crate::retry::{update_with_retry, RetryConfig};
use crate::selector::Selector;
use crate::stores::Stores;
use fleetsync_protocol::AppInfo;
use fleetsync_store::{Resource, ResourceKind};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Where an application ended up after a placement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    /// Nodes whose desire holds the application after the pass.
    ///
    /// A node whose write failed is counted by what it held before the pass.
    pub assigned: BTreeSet<String>,
    /// Nodes whose desire was written.
    pub changed: BTreeSet<String>,
}

/// Writes applications into (and out of) node desire.
///
/// The engine does not touch the index: callers refresh it with
/// [`Assignment::assigned`] once the node writes have landed.
pub struct AssignmentEngine {
    stores: Stores,
    retry: RetryConfig,
}

impl AssignmentEngine {
    /// Creates a new assignment engine.
    pub fn new(stores: Stores, retry: RetryConfig) -> Self {
        Self { stores, retry }
    }

    /// Places `app` on every node in its namespace matching `selector`, and
    /// removes it from every node that holds it but no longer matches.
    ///
    /// Matching nodes get `(app.name, app.version)` upserted into the system or
    /// user list depending on `app.system`. Each node is a separate
    /// read-modify-write; one failing node does not stop the others.
    ///
    /// # Errors
    ///
    /// Returns an error only if the nodes cannot be listed. Per-node failures
    /// are reported as warnings.
    pub fn update_node_app_version(
        &self,
        app: &Application,
        selector: &Selector,
    ) -> CoreResult<Outcome<Assignment>> {
        let info = app.app_info();
        self.place(app, |node| {
            if selector.matches(&node.selector_labels()) {
                Some(info.clone())
            } else {
                None
            }
        })
    }

    /// Removes `app` from every node in its namespace, regardless of selector.
    ///
    /// # Errors
    ///
    /// Returns an error only if the nodes cannot be listed.
    pub fn delete_node_app_version(&self, app: &Application) -> CoreResult<Outcome<Assignment>> {
        self.place(app, |_| None)
    }

    fn place(
        &self,
        app: &Application,
        target: impl Fn(&Node) -> Option<AppInfo>,
    ) -> CoreResult<Outcome<Assignment>> {
        let nodes = self.stores.nodes.list(&app.namespace)?;
        let mut outcome = Outcome::new(Assignment::default());

        for node in nodes {
            let wants = target(&node);
            let holds = node.desire.get(&app.name);
            let up_to_date = match (&wants, holds) {
                (None, None) => true,
                (Some(w), Some(h)) => {
                    w == h && node.desire.list(app.system).iter().any(|a| a.name == app.name)
                }
                _ => false,
            };
            if up_to_date {
                if wants.is_some() {
                    outcome.value.assigned.insert(node.name.clone());
                }
                continue;
            }

            let key = node.key();
            // Re-evaluate on every attempt: labels may change between reads.
            let result = update_with_retry(&*self.stores.nodes, &key, &self.retry, |n| {
                match target(&*n) {
                    Some(info) => n.desire.upsert(app.system, info),
                    None => n.desire.remove(&app.name),
                }
            });

            match result {
                Ok(write) => {
                    let updated = write.is_updated();
                    let record = write.into_inner();
                    if updated {
                        debug!(node = %key, app = %app.name, "node desire updated");
                        outcome.value.changed.insert(record.name.clone());
                    }
                    if record.desire.contains(&app.name) {
                        outcome.value.assigned.insert(record.name);
                    }
                }
                Err(CoreError::NotFound { .. }) => {
                    debug!(node = %key, "node deleted during assignment");
                }
                Err(err) => {
                    if holds.is_some() {
                        outcome.value.assigned.insert(node.name.clone());
                    }
                    outcome.warn(CascadeWarning::new(ResourceKind::Node, &key, err));
                }
            }
        }

        info!(
            app = %app.key(),
            version = %app.version,
            assigned = outcome.value.assigned.len(),
            changed = outcome.value.changed.len(),
            failed = outcome.warnings.len(),
            "placement complete"
        );
        Ok(outcome)
    }
}

impl std::fmt::Debug for AssignmentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentEngine")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
