//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ragcore: multi-tenant document question answering over prebuilt
/// hybrid indices.
#[derive(Parser, Debug)]
#[command(name = "ragcore")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root directory containing `databases/`.
    #[arg(short, long, env = "RAGCORE_DATA_ROOT")]
    pub data_root: Option<PathBuf>,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question against a namespace's documents.
    Ask {
        /// Tenant identifier.
        #[arg(short, long)]
        tenant: String,

        /// Scenario identifier (e.g. tender, enterprise).
        #[arg(short, long)]
        scenario: String,

        /// The question to answer.
        question: String,
    },

    /// Build missing indices for a namespace and load them.
    Prepare {
        /// Tenant identifier.
        #[arg(short, long)]
        tenant: String,

        /// Scenario identifier.
        #[arg(short, long)]
        scenario: String,

        /// Rebuild indices even when they already exist.
        #[arg(short, long)]
        force: bool,
    },

    /// Show a namespace's loaded indices and statistics.
    Status {
        /// Tenant identifier.
        #[arg(short, long)]
        tenant: String,

        /// Scenario identifier.
        #[arg(short, long)]
        scenario: String,
    },
}
