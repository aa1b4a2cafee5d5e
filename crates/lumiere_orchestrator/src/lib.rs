//! Generation orchestration for Lumiere.
//!
//! [`GenerationOrchestrator`] takes planned takes through a per-take state
//! machine: cache lookup, credit reservation, provider submission and
//! polling, persistence, commit, and continuity anchor extraction. Timing is
//! governed by a [`BackoffPolicy`]; a [`ProviderStrategy`] supplies the
//! primary provider and an optional fallback.
//!
//! # Example
//!
//! ```no_run
//! use lumiere_cache::ResultCache;
//! use lumiere_core::{DurationRange, Take};
//! use lumiere_ledger::CreditLedger;
//! use lumiere_models::{DigestFrameExtractor, SimulatedProvider};
//! use lumiere_orchestrator::{GenerationOrchestrator, ProviderStrategy};
//! use lumiere_storage::{AssetStore, MemoryAssetStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> lumiere_error::LumiereResult<()> {
//! let store: Arc<dyn AssetStore> = Arc::new(MemoryAssetStore::new());
//! let orchestrator = GenerationOrchestrator::new(
//!     ProviderStrategy::new(Arc::new(SimulatedProvider::new("sim"))),
//!     Arc::new(CreditLedger::new(100)),
//!     Arc::new(ResultCache::in_memory()),
//!     store.clone(),
//!     Arc::new(DigestFrameExtractor::new(store)),
//! );
//!
//! let takes = vec![Take::new(0, "A lighthouse at dusk.", DurationRange::new(2.0, 6.0))];
//! let timeline = orchestrator.run(takes, 2).await?;
//! assert!(timeline.is_complete());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod anchors;
mod backoff;
mod config;
mod graph;
mod limiter;
mod orchestrator;
mod state;
mod strategy;

pub use anchors::AnchorArena;
pub use backoff::{BackoffPolicy, BackoffPolicyBuilder};
pub use config::{OrchestratorConfig, OrchestratorConfigBuilder};
pub use graph::split_chains;
pub use limiter::SubmitLimiter;
pub use orchestrator::GenerationOrchestrator;
pub use state::{TakeMachine, is_allowed};
pub use strategy::{ProviderSlot, ProviderStrategy};
