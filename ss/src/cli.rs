//! CLI argument parsing for snapstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ss")]
#[command(author, version, about = "Immutable snapshot store for exercise files", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the snapshot directory
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List all snapshots
    List,

    /// Print the files in a snapshot
    Cat {
        /// Snapshot reference
        #[arg(required = true)]
        snapshot_ref: String,

        /// Only print this file
        #[arg(short, long)]
        path: Option<String>,

        /// Print the file set as JSON
        #[arg(long)]
        json: bool,
    },

    /// Package a directory into a new snapshot
    Pack {
        /// Directory to package
        #[arg(required = true)]
        dir: PathBuf,
    },

    /// Show statistics for a snapshot
    Stats {
        /// Snapshot reference
        #[arg(required = true)]
        snapshot_ref: String,
    },
}
