//! Place command implementation.

use super::{load_plane, print_json, write_snapshot, CliResult, Format};
use fleetsync_core::{FleetSnapshot, NodeDesire, ReconcileReport};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Result of a placement run.
#[derive(Debug, Serialize)]
pub struct PlaceResult {
    /// What the reconciliation pass repaired.
    pub report: ReconcileReport,
    /// Every node's desire after placement.
    pub nodes: BTreeMap<String, NodeDesire>,
    /// Steps that failed and were skipped.
    pub warnings: Vec<String>,
}

/// Reconciles a snapshot namespace in memory.
///
/// Returns the result together with the repaired namespace.
pub fn collect(path: &Path, namespace: &str) -> CliResult<(PlaceResult, FleetSnapshot)> {
    let plane = load_plane(path, namespace)?;
    let outcome = plane.reconcile_namespace(namespace)?;

    let nodes = plane
        .stores()
        .nodes
        .list(namespace)?
        .into_iter()
        .map(|n| (n.name, n.desire))
        .collect();
    let result = PlaceResult {
        report: outcome.value,
        nodes,
        warnings: outcome.warnings.iter().map(ToString::to_string).collect(),
    };
    let snapshot = FleetSnapshot::capture(plane.stores(), namespace)?;
    Ok((result, snapshot))
}

/// Runs the place command.
pub fn run(path: &Path, namespace: &str, output: Option<&Path>, format: Format) -> CliResult<()> {
    let (result, snapshot) = collect(path, namespace)?;

    if let Some(output) = output {
        write_snapshot(output, &snapshot)?;
        tracing::info!(path = %output.display(), "repaired snapshot written");
    }

    match format {
        Format::Json => print_json(&result)?,
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &PlaceResult) {
    let report = &result.report;
    println!(
        "Re-placed {} applications, {} nodes changed",
        report.synced_apps.len(),
        report.changed_nodes.len()
    );
    if !report.bumped_apps.is_empty() {
        println!("Stale references moved forward: {}", report.bumped_apps.join(", "));
    }
    for (node, app) in &report.removed_orphans {
        println!("Removed orphaned {app} from {node}");
    }
    println!();
    for (node, desire) in &result.nodes {
        println!("{node}:");
        for info in &desire.system_apps {
            println!("  [system] {} @ {}", info.name, info.version);
        }
        for info in &desire.apps {
            println!("  {} @ {}", info.name, info.version);
        }
    }
    for warning in &result.warnings {
        println!("! {warning}");
    }
}
