//! Inspect command implementation.

use super::{load_plane, print_json, CliResult, Format};
use fleetsync_core::ControlPlane;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Index contents of one namespace.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Namespace inspected.
    pub namespace: String,
    /// Number of nodes.
    pub node_count: usize,
    /// Application name to assigned nodes.
    pub applications: BTreeMap<String, Vec<String>>,
    /// Configuration name to dependent applications.
    pub configs: BTreeMap<String, Vec<String>>,
    /// Secret name to dependent applications.
    pub secrets: BTreeMap<String, Vec<String>>,
}

/// Collects the index contents of a namespace.
pub fn collect(plane: &ControlPlane, namespace: &str) -> CliResult<InspectResult> {
    let stores = plane.stores();
    let applications = stores
        .apps
        .list(namespace)?
        .into_iter()
        .map(|a| {
            let nodes = plane.list_nodes_for_app(namespace, &a.name);
            (a.name, nodes)
        })
        .collect();
    let configs = stores
        .configs
        .list(namespace)?
        .into_iter()
        .map(|c| {
            let apps = plane.list_apps_for_config(namespace, &c.name);
            (c.name, apps)
        })
        .collect();
    let secrets = stores
        .secrets
        .list(namespace)?
        .into_iter()
        .map(|s| {
            let apps = plane.list_apps_for_secret(namespace, &s.name);
            (s.name, apps)
        })
        .collect();

    Ok(InspectResult {
        namespace: namespace.to_string(),
        node_count: stores.nodes.list(namespace)?.len(),
        applications,
        configs,
        secrets,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, namespace: &str, format: Format) -> CliResult<()> {
    let plane = load_plane(path, namespace)?;
    let result = collect(&plane, namespace)?;

    match format {
        Format::Json => print_json(&result)?,
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Namespace: {}", result.namespace);
    println!("Nodes: {}", result.node_count);
    print_section("Applications", "nodes", &result.applications);
    print_section("Configurations", "used by", &result.configs);
    print_section("Secrets", "used by", &result.secrets);
}

fn print_section(title: &str, label: &str, entries: &BTreeMap<String, Vec<String>>) {
    println!();
    println!("{title} ({}):", entries.len());
    for (name, users) in entries {
        if users.is_empty() {
            println!("  {name:<24} {label}: -");
        } else {
            println!("  {name:<24} {label}: {}", users.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_testkit::scenarios;

    #[test]
    fn inspect_reads_indexes_from_a_snapshot_file() {
        let fleet = scenarios::two_zone_fleet();
        let file = fleet.write_snapshot();

        let plane = load_plane(file.path(), "default").unwrap();
        let result = collect(&plane, "default").unwrap();

        assert_eq!(result.node_count, 3);
        assert_eq!(result.applications["web"], vec!["edge-1", "edge-2"]);
        assert_eq!(result.configs["settings"], vec!["web"]);
        assert!(result.secrets.is_empty());
    }

    #[test]
    fn other_namespaces_are_empty() {
        let file = scenarios::two_zone_fleet().write_snapshot();
        let plane = load_plane(file.path(), "lab").unwrap();
        let result = collect(&plane, "lab").unwrap();
        assert_eq!(result.node_count, 0);
        assert!(result.applications.is_empty());
    }
}
