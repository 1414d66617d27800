//! fleetsync CLI
//!
//! Offline tools over a JSON fleet snapshot.
//!
//! # Commands
//!
//! - `inspect` - Display the application, configuration and secret indexes
//! - `verify` - Check the snapshot for inconsistencies
//! - `delta` - Show what a node still has to converge to
//! - `place` - Re-run placement and print every node's desire

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// fleetsync command-line snapshot tools.
#[derive(Parser)]
#[command(name = "fleetsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON fleet snapshot
    #[arg(global = true, short, long)]
    snapshot: Option<PathBuf>,

    /// Namespace to operate on
    #[arg(global = true, short, long, default_value = "default")]
    namespace: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display who uses what, after rebuilding the indexes
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Check the snapshot for inconsistencies
    Verify {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show the delta between a node's desire and its last report
    Delta {
        /// Node name
        #[arg(long)]
        node: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Re-run placement for every application and print each node's desire
    Place {
        /// Write the repaired snapshot here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let namespace = cli.namespace.as_str();
    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.snapshot.ok_or("Snapshot path required for inspect")?;
            commands::inspect::run(&path, namespace, format)?;
        }
        Commands::Verify { format } => {
            let path = cli.snapshot.ok_or("Snapshot path required for verify")?;
            commands::verify::run(&path, namespace, format)?;
        }
        Commands::Delta { node, format } => {
            let path = cli.snapshot.ok_or("Snapshot path required for delta")?;
            commands::delta::run(&path, namespace, &node, format)?;
        }
        Commands::Place { output, format } => {
            let path = cli.snapshot.ok_or("Snapshot path required for place")?;
            commands::place::run(&path, namespace, output.as_deref(), format)?;
        }
        Commands::Version => {
            println!("fleetsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("sync protocol v{}", fleetsync_protocol::PROTOCOL_VERSION);
        }
    }

    Ok(())
}
