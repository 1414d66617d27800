//! Delta command implementation.

use super::{load_plane, print_json, CliError, CliResult, Format};
use fleetsync_protocol::{AppDelta, Delta};
use fleetsync_store::ObjectKey;
use serde::Serialize;
use std::path::Path;

/// What a node still has to converge to.
#[derive(Debug, Serialize)]
pub struct DeltaResult {
    /// Node name.
    pub node: String,
    /// Whether the node has ever reported. Without a report the delta is
    /// the whole desire.
    pub reported: bool,
    /// The delta.
    pub delta: Delta,
}

/// Computes the delta a node would get on its next report, if it reported
/// the same state as last time.
pub fn collect(path: &Path, namespace: &str, node: &str) -> CliResult<DeltaResult> {
    let plane = load_plane(path, namespace)?;
    let record = match plane.stores().nodes.get(&ObjectKey::new(namespace, node)) {
        Ok(record) => record,
        Err(err) if err.is_not_found() => {
            return Err(CliError::UnknownNode {
                namespace: namespace.to_string(),
                name: node.to_string(),
            })
        }
        Err(err) => return Err(err.into()),
    };

    let reported = record.report.is_some();
    let report = record.report.unwrap_or_default();
    let delta = Delta::compute(
        &record.desire.system_apps,
        &record.desire.apps,
        &report.system_apps,
        &report.apps,
    );
    Ok(DeltaResult {
        node: record.name,
        reported,
        delta,
    })
}

/// Runs the delta command.
pub fn run(path: &Path, namespace: &str, node: &str, format: Format) -> CliResult<()> {
    let result = collect(path, namespace, node)?;

    match format {
        Format::Json => print_json(&result)?,
        Format::Text => {
            println!("Node: {}/{}", namespace, result.node);
            if !result.reported {
                println!("(node has not reported yet)");
            }
            if result.delta.is_empty() {
                println!("✓ Converged");
            } else {
                print_app_delta("System applications", &result.delta.system);
                print_app_delta("Applications", &result.delta.apps);
            }
        }
    }
    Ok(())
}

fn print_app_delta(title: &str, delta: &AppDelta) {
    if delta.is_empty() {
        return;
    }
    println!("{title}:");
    for info in &delta.upsert {
        println!("  + {} @ {}", info.name, info.version);
    }
    for name in &delta.remove {
        println!("  - {name}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_protocol::{AppInfo, ReportPayload};
    use fleetsync_testkit::scenarios;

    #[test]
    fn unreported_node_gets_its_whole_desire() {
        let file = scenarios::two_zone_fleet().write_snapshot();
        let result = collect(file.path(), "default", "edge-1").unwrap();

        assert!(!result.reported);
        assert_eq!(result.delta.apps.upsert, vec![AppInfo::new("web", 1u64)]);
    }

    #[test]
    fn stored_report_is_diffed() {
        let fleet = scenarios::two_zone_fleet();
        let mut node = fleet.node("edge-1");
        node.report = Some(ReportPayload::new(
            Vec::new(),
            vec![AppInfo::new("web", 1u64), AppInfo::new("legacy", 3u64)],
        ));
        fleet.stores().nodes.update(node).unwrap();
        let file = fleet.write_snapshot();

        let result = collect(file.path(), "default", "edge-1").unwrap();
        assert!(result.reported);
        assert!(result.delta.apps.upsert.is_empty());
        assert_eq!(result.delta.apps.remove, vec!["legacy".to_string()]);
    }

    #[test]
    fn unknown_node() {
        let file = scenarios::two_zone_fleet().write_snapshot();
        let err = collect(file.path(), "default", "ghost").unwrap_err();
        assert!(matches!(err, CliError::UnknownNode { .. }));
    }
}
