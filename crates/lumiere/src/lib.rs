//! Lumiere - script to video generation pipeline
//!
//! Lumiere turns a text script into an ordered set of generated video clips.
//! A script is cut into bounded segments, segments become takes that may be
//! chained for visual continuity, and takes are generated through external
//! providers with caching, retries, and prepaid credit accounting.
//!
//! # Quick Start
//!
//! ```no_run
//! use lumiere::{LumiereConfig, Pipeline, PipelineOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LumiereConfig::load()?;
//!     let options = PipelineOptions::default().with_simulate(true).with_balance(Some(50));
//!     let pipeline = Pipeline::from_config(&config, &options)?;
//!
//!     let report = pipeline.run("A door opens. Light spills across the floor.").await?;
//!     for entry in report.timeline().entries() {
//!         println!("{} {}", entry.take().index(), entry.final_status());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! Lumiere is organized as a workspace with focused crates:
//!
//! - `lumiere_error` - Error types
//! - `lumiere_core` - Segments, takes, requests, timeline
//! - `lumiere_interface` - Provider, boundary proposer and frame extractor traits
//! - `lumiere_storage` - Content-addressed asset stores
//! - `lumiere_cache` - Write-once result cache
//! - `lumiere_ledger` - Prepaid credit ledger
//! - `lumiere_script` - Segmenter and continuity planner
//! - `lumiere_models` - HTTP and simulated providers, frame extractors
//! - `lumiere_orchestrator` - Per-take state machine and batch runner
//!
//! This crate (`lumiere`) re-exports everything for convenience.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod pipeline;

pub use config::{
    ContinuityConfig, ExtractorKind, FramesConfig, LedgerConfig, LumiereConfig, ProviderConfig,
    ProviderKind, ProvidersConfig, StorageConfig,
};
pub use pipeline::{Pipeline, PipelineOptions, PipelineReport};

pub use lumiere_cache::*;
pub use lumiere_core::*;
pub use lumiere_error::*;
pub use lumiere_interface::*;
pub use lumiere_ledger::*;
pub use lumiere_models::*;
pub use lumiere_orchestrator::*;
pub use lumiere_script::*;
pub use lumiere_storage::*;
