//! Application version pairs and the desired/reported diff.

use fleetsync_store::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An application a node runs (or should run), at a specific version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppInfo {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: Version,
}

impl AppInfo {
    /// Creates a new app info.
    pub fn new(name: impl Into<String>, version: impl Into<Version>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for AppInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Difference between one desired list and the matching reported list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDelta {
    /// Applications the node must install or move to a different version.
    pub upsert: Vec<AppInfo>,
    /// Applications the node runs but should no longer run.
    pub remove: Vec<String>,
}

impl AppDelta {
    /// Computes what a node reporting `reported` still has to do to reach `desired`.
    ///
    /// Upserts keep the order of `desired`; removals keep the order of
    /// `reported`. The cloud is authoritative, so any version mismatch is an
    /// upsert, even if the node reports something newer.
    #[must_use]
    pub fn diff(desired: &[AppInfo], reported: &[AppInfo]) -> Self {
        let reported_by_name: BTreeMap<&str, &Version> = reported
            .iter()
            .map(|a| (a.name.as_str(), &a.version))
            .collect();
        let desired_names: BTreeMap<&str, ()> =
            desired.iter().map(|a| (a.name.as_str(), ())).collect();

        let upsert = desired
            .iter()
            .filter(|a| reported_by_name.get(a.name.as_str()) != Some(&&a.version))
            .cloned()
            .collect();

        let mut remove: Vec<String> = Vec::new();
        for app in reported {
            if !desired_names.contains_key(app.name.as_str()) && !remove.contains(&app.name) {
                remove.push(app.name.clone());
            }
        }

        Self { upsert, remove }
    }

    /// Returns true if there is nothing to converge.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.remove.is_empty()
    }
}

/// The part of a node's desire it has not yet converged to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// Operator-managed system applications.
    pub system: AppDelta,
    /// User applications.
    pub apps: AppDelta,
}

impl Delta {
    /// Computes the delta for both application lists.
    #[must_use]
    pub fn compute(
        desired_system: &[AppInfo],
        desired_apps: &[AppInfo],
        reported_system: &[AppInfo],
        reported_apps: &[AppInfo],
    ) -> Self {
        Self {
            system: AppDelta::diff(desired_system, reported_system),
            apps: AppDelta::diff(desired_apps, reported_apps),
        }
    }

    /// Returns true if the node has fully converged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.apps.is_empty()
    }

    /// Finds a pending upsert by application name, in either list.
    #[must_use]
    pub fn upsert_for(&self, name: &str) -> Option<&AppInfo> {
        self.system
            .upsert
            .iter()
            .chain(self.apps.upsert.iter())
            .find(|a| a.name == name)
    }
}
