//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Lumiere - turn scripts into continuity-aware generated video
#[derive(Parser, Debug)]
#[command(name = "lumiere")]
#[command(about = "Turn scripts into continuity-aware generated video", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file layered over the defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cut a script into segments
    Segment {
        /// Path to the script text
        script: PathBuf,
    },

    /// Segment a script and show the planned takes
    Plan {
        /// Path to the script text
        script: PathBuf,
    },

    /// Segment, plan and generate every take
    Run {
        /// Path to the script text
        script: PathBuf,

        /// Use the simulated provider and digest frames
        #[arg(long)]
        simulate: bool,

        /// Starting credit balance, overriding configuration
        #[arg(long)]
        balance: Option<u64>,
    },

    /// Result cache maintenance
    #[command(subcommand)]
    Cache(CacheCommands),
}

/// Result cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Remove the cached result for a fingerprint
    Purge {
        /// 64-character hex fingerprint
        fingerprint: String,
    },
}

/// Output format options
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}
