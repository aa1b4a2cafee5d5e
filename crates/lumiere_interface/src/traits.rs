//! Collaborator traits.

use async_trait::async_trait;
use lumiere_core::{AssetRef, PollStatus, ProposedBoundary, ProviderTaskId, SegmentConstraints, SubmitRequest};
use lumiere_error::{LumiereResult, ProviderResult};

/// Unreliable, rate-limited video generation service.
///
/// Implementations report "task not found" as a
/// [`ProviderErrorKind::NotFound`](lumiere_error::ProviderErrorKind::NotFound)
/// error; the orchestrator decides how long to tolerate it.
#[async_trait]
pub trait ExternalProvider: Send + Sync {
    /// Provider identity, hashed into request fingerprints.
    fn provider_name(&self) -> &str;

    /// Submit a generation task.
    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<ProviderTaskId>;

    /// Query the state of a task.
    async fn poll(&self, task_id: &ProviderTaskId) -> ProviderResult<PollStatus>;

    /// Fetch the bytes of a finished asset.
    async fn download(&self, asset_url: &str) -> ProviderResult<Vec<u8>>;

    /// Ask the provider to abandon a task. Best effort.
    async fn cancel(&self, _task_id: &ProviderTaskId) -> ProviderResult<()> {
        Ok(())
    }
}

/// Suggests segment boundaries for a script, typically backed by an LLM.
#[async_trait]
pub trait BoundaryProposer: Send + Sync {
    /// Whether the proposer has what it needs (credentials, model) to run.
    fn is_configured(&self) -> bool {
        true
    }

    /// Propose ordered segments whose texts appear verbatim in `text`.
    async fn classify(
        &self,
        text: &str,
        constraints: &SegmentConstraints,
    ) -> LumiereResult<Vec<ProposedBoundary>>;
}

/// Pulls a still frame out of a stored clip.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Extract the frame at `time_fraction` (0.0 = start, 1.0 = end) of the clip.
    async fn extract(&self, asset: &AssetRef, time_fraction: f64) -> LumiereResult<Vec<u8>>;
}
