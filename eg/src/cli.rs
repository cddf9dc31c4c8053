//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// exgen - verification-gated code generation for exercises
#[derive(Parser)]
#[command(
    name = "eg",
    about = "Generate and refine exercise source files through a verified model loop",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP submission endpoint
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one user turn against an exercise
    Submit {
        /// Exercise slug
        slug: String,

        /// Instruction for the model
        prompt: String,
    },

    /// Manage exercises
    Exercise {
        #[command(subcommand)]
        command: ExerciseCommand,
    },

    /// Show an exercise's generation history
    History {
        slug: String,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the files of a snapshot
    Show {
        slug: String,

        /// Generation to show (defaults to the latest completed one)
        #[arg(short, long)]
        generation: Option<String>,

        /// Only print this file (repository-relative)
        #[arg(short, long)]
        path: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ExerciseCommand {
    /// Register a new exercise
    Add {
        /// Lowercase slug; files live under exercises/<slug>/
        slug: String,

        /// Display title (defaults to the slug)
        #[arg(short, long)]
        title: Option<String>,
    },

    /// List registered exercises
    List {
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
