//! CLI command implementations.

pub mod delta;
pub mod inspect;
pub mod place;
pub mod verify;

use clap::ValueEnum;
use fleetsync_core::{ControlPlane, CoreError, FleetSnapshot};
use fleetsync_store::StoreError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors a command can end with.
#[derive(Debug, Error)]
pub enum CliError {
    /// Snapshot file could not be read or written.
    #[error("snapshot {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Snapshot file is not a valid fleet snapshot.
    #[error("snapshot {path} is malformed: {source}")]
    Malformed {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// Output could not be rendered.
    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),

    /// Control plane error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The snapshot has no such node.
    #[error("no node {name} in namespace {namespace}")]
    UnknownNode {
        /// Namespace searched.
        namespace: String,
        /// Node name.
        name: String,
    },

    /// Verification found problems.
    #[error("verification found {0} inconsistencies")]
    Inconsistent(usize),
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Reads a snapshot file.
pub fn read_snapshot(path: &Path) -> CliResult<FleetSnapshot> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a snapshot file.
pub fn write_snapshot(path: &Path, snapshot: &FleetSnapshot) -> CliResult<()> {
    let text = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, text).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads a snapshot into a control plane with the namespace indexed.
pub fn load_plane(path: &Path, namespace: &str) -> CliResult<ControlPlane> {
    let snapshot = read_snapshot(path)?;
    tracing::debug!(
        path = %path.display(),
        nodes = snapshot.nodes.len(),
        applications = snapshot.applications.len(),
        "snapshot loaded"
    );
    let plane = ControlPlane::new(snapshot.into_stores());
    plane.rebuild_index(namespace)?;
    Ok(plane)
}

/// Prints a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
