//! End-to-end script to timeline pipeline.

use crate::{ExtractorKind, LumiereConfig, ProviderConfig, ProviderKind};
use derive_getters::Getters;
use lumiere_cache::ResultCache;
use lumiere_core::{SegmentationMode, SegmentationOutput, Take, TakeEvent, Timeline};
use lumiere_error::LumiereResult;
use lumiere_interface::{BoundaryProposer, ExternalProvider, FrameExtractor};
use lumiere_ledger::{CreditLedger, LedgerSnapshot};
use lumiere_models::{
    DigestFrameExtractor, FfmpegFrameExtractor, HttpVideoProvider, KeywordBoundaryProposer,
    SimulatedProvider,
};
use lumiere_orchestrator::{GenerationOrchestrator, ProviderStrategy};
use lumiere_script::{ContinuityPlanner, ScriptSegmenter};
use lumiere_storage::{AssetStore, FileSystemAssetStore, MemoryAssetStore};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, instrument};

/// Overrides applied on top of configuration when building a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct PipelineOptions {
    /// Replace every provider with a simulated one and use digest frames
    simulate: bool,
    /// Starting balance instead of the configured one
    balance: Option<u64>,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Getters)]
pub struct PipelineReport {
    /// Segments the script was cut into
    segmentation: SegmentationOutput,
    /// Per-take outcomes
    timeline: Timeline,
    /// Ledger state after the batch
    ledger: LedgerSnapshot,
}

/// Segmenter, planner and orchestrator wired together.
///
/// # Example
///
/// ```no_run
/// use lumiere::{LumiereConfig, Pipeline, PipelineOptions};
///
/// # async fn example() -> lumiere_error::LumiereResult<()> {
/// let config = LumiereConfig::load()?;
/// let options = PipelineOptions::default().with_simulate(true).with_balance(Some(100));
/// let pipeline = Pipeline::from_config(&config, &options)?;
/// let report = pipeline.run("INT. KITCHEN - NIGHT\n\nThe kettle screams.").await?;
/// println!("{} takes committed", report.timeline().committed_count());
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    segmenter: ScriptSegmenter,
    segmentation: SegmentationMode,
    planner: ContinuityPlanner,
    proposer: Option<Arc<dyn BoundaryProposer>>,
    orchestrator: GenerationOrchestrator,
    concurrency_budget: usize,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("segmenter", &self.segmenter)
            .field("segmentation", &self.segmentation)
            .field("planner", &self.planner)
            .field("orchestrator", &self.orchestrator)
            .field("concurrency_budget", &self.concurrency_budget)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Assemble a pipeline from parts.
    pub fn new(
        segmenter: ScriptSegmenter,
        segmentation: SegmentationMode,
        planner: ContinuityPlanner,
        orchestrator: GenerationOrchestrator,
        concurrency_budget: usize,
    ) -> Self {
        Self {
            segmenter,
            segmentation,
            planner,
            proposer: None,
            orchestrator,
            concurrency_budget,
        }
    }

    /// Build every collaborator described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, an HTTP provider is
    /// missing its API key, or the asset directory cannot be created.
    #[instrument(skip(config))]
    pub fn from_config(config: &LumiereConfig, options: &PipelineOptions) -> LumiereResult<Self> {
        config.validate()?;

        let store: Arc<dyn AssetStore> = match config.storage().directory() {
            Some(directory) => Arc::new(FileSystemAssetStore::new(directory)?),
            None => Arc::new(MemoryAssetStore::new()),
        };

        let extractor: Arc<dyn FrameExtractor> =
            match (options.simulate, config.frames().extractor()) {
                (true, _) | (false, ExtractorKind::Digest) => {
                    Arc::new(DigestFrameExtractor::new(store.clone()))
                }
                (false, ExtractorKind::Ffmpeg) => Arc::new(
                    FfmpegFrameExtractor::new(store.clone())
                        .with_tools(config.frames().ffmpeg(), config.frames().ffprobe()),
                ),
            };

        let providers = config.providers();
        let mut strategy =
            ProviderStrategy::new(build_provider(providers.primary(), options.simulate)?);
        if let Some(fallback) = providers.fallback() {
            strategy = strategy.with_fallback(build_provider(fallback, options.simulate)?);
        }

        let balance = options.balance.unwrap_or(*config.ledger().balance());
        let ledger = Arc::new(CreditLedger::with_account(
            config.ledger().account().clone(),
            balance,
        ));
        let cache = Arc::new(ResultCache::new(config.cache().clone()));

        let orchestrator = GenerationOrchestrator::new(strategy, ledger, cache, store, extractor)
            .with_config(config.orchestrator().clone())
            .with_backoff(config.backoff().clone())
            .with_generation_params(config.generation().clone());

        let mut pipeline = Self::new(
            ScriptSegmenter::new(config.segmenter().clone()),
            *config.segmentation(),
            ContinuityPlanner::new(*config.continuity().mode()),
            orchestrator,
            *config.orchestrator().concurrency_budget(),
        );
        if *config.segmentation() == SegmentationMode::Assisted {
            pipeline = pipeline.with_proposer(Arc::new(KeywordBoundaryProposer::new()));
        }
        info!(
            simulate = options.simulate,
            balance,
            continuity = %config.continuity().mode(),
            "Pipeline ready"
        );
        Ok(pipeline)
    }

    /// Use `proposer` for assisted segmentation.
    pub fn with_proposer(mut self, proposer: Arc<dyn BoundaryProposer>) -> Self {
        self.proposer = Some(proposer);
        self
    }

    /// Forward take state changes to `events`.
    pub fn with_events(mut self, events: UnboundedSender<TakeEvent>) -> Self {
        self.orchestrator = self.orchestrator.with_events(events);
        self
    }

    /// The orchestrator, e.g. to cancel a running batch.
    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    /// Cut a script into segments.
    ///
    /// # Errors
    ///
    /// Returns a script error for empty input, invalid constraints, or
    /// unresolvable strict limits.
    pub async fn segment(&self, script: &str) -> LumiereResult<SegmentationOutput> {
        self.segmenter
            .segment(script, self.segmentation, self.proposer.as_deref())
            .await
    }

    /// Segment and plan takes without generating anything.
    ///
    /// # Errors
    ///
    /// Returns the segmentation error, if any.
    pub async fn plan(&self, script: &str) -> LumiereResult<(SegmentationOutput, Vec<Take>)> {
        let segmentation = self.segment(script).await?;
        let takes = self.planner.plan(segmentation.segments());
        Ok((segmentation, takes))
    }

    /// Segment, plan and generate.
    ///
    /// # Errors
    ///
    /// Returns segmentation errors and batch validation errors. Per-take
    /// failures are reported in the timeline.
    #[instrument(skip(self, script), fields(script_len = script.len()))]
    pub async fn run(&self, script: &str) -> LumiereResult<PipelineReport> {
        let (segmentation, takes) = self.plan(script).await?;
        info!(takes = takes.len(), mode = %self.planner.mode(), "Planned takes");
        let timeline = self.orchestrator.run(takes, self.concurrency_budget).await?;
        let ledger = self.orchestrator.ledger().snapshot().await;
        Ok(PipelineReport {
            segmentation,
            timeline,
            ledger,
        })
    }
}

fn build_provider(config: &ProviderConfig, simulate: bool) -> LumiereResult<Arc<dyn ExternalProvider>> {
    if simulate || *config.kind() == ProviderKind::Simulated {
        return Ok(Arc::new(SimulatedProvider::new(config.name().clone())));
    }
    let base_url = config.base_url().clone().unwrap_or_default();
    let model = config.model().clone().unwrap_or_default();
    let provider = HttpVideoProvider::new(config.name().clone(), base_url, model, config.api_key()?)?;
    Ok(Arc::new(provider))
}
