//! Verify command implementation.

use super::{load_plane, print_json, CliError, CliResult, Format};
use fleetsync_core::Inconsistency;
use serde::Serialize;
use std::path::Path;

/// Verification result.
#[derive(Debug, Serialize)]
pub struct VerifyResult {
    /// Namespace verified.
    pub namespace: String,
    /// Every problem found.
    pub inconsistencies: Vec<Inconsistency>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.inconsistencies.is_empty()
    }
}

/// Checks a snapshot file.
pub fn collect(path: &Path, namespace: &str) -> CliResult<VerifyResult> {
    let plane = load_plane(path, namespace)?;
    Ok(VerifyResult {
        namespace: namespace.to_string(),
        inconsistencies: plane.verify_namespace(namespace)?,
    })
}

/// Runs the verify command.
///
/// Fails with [`CliError::Inconsistent`] when anything was found, so the
/// exit status is usable in scripts.
pub fn run(path: &Path, namespace: &str, format: Format) -> CliResult<()> {
    let result = collect(path, namespace)?;

    match format {
        Format::Json => print_json(&result)?,
        Format::Text => {
            println!("Verifying namespace {} in {:?}", result.namespace, path);
            println!();
            for problem in &result.inconsistencies {
                println!("  ✗ {problem}");
            }
            if result.is_ok() {
                println!("✓ Snapshot verification passed");
            } else {
                println!();
                println!("✗ Snapshot verification failed");
            }
        }
    }

    if result.is_ok() {
        Ok(())
    } else {
        Err(CliError::Inconsistent(result.inconsistencies.len()))
    }
}
