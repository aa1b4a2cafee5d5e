//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the lumiere binary.

mod cache;
mod commands;
mod logging;
mod run;

pub use cache::purge_fingerprint;
pub use commands::{CacheCommands, Cli, Commands, OutputFormat};
pub use logging::init_logging;
pub use run::{plan_script, run_script, segment_script};
