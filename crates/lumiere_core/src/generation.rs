//! Provider-facing request and response shapes.

use crate::{AssetRef, ProviderParams};
use serde::{Deserialize, Serialize};

/// Identifier assigned by a provider to a submitted task.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[display("{}", _0)]
pub struct ProviderTaskId(String);

impl ProviderTaskId {
    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProviderTaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Payload handed to a provider on submission.
#[derive(Debug, Clone, PartialEq, derive_new::new, derive_getters::Getters)]
pub struct SubmitRequest {
    /// Prompt text
    prompt: String,
    /// Generation parameters
    params: ProviderParams,
    /// Seed image bytes for image-to-video continuity
    seed_image: Option<Vec<u8>>,
}

/// Status returned by a provider poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollStatus {
    /// Accepted but not started
    Waiting,
    /// Generation in progress
    Processing {
        /// Progress between 0 and 1 when reported
        progress: Option<f32>,
    },
    /// Asset is ready for download
    Succeeded {
        /// Where the asset can be downloaded
        asset_url: String,
    },
    /// Provider gave up on the task
    Failed {
        /// Provider-reported reason
        reason: String,
    },
}

impl PollStatus {
    /// Whether polling can stop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollStatus::Succeeded { .. } | PollStatus::Failed { .. })
    }
}

/// Terminal outcome of a provider task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    /// Task produced an asset
    Succeeded,
    /// Task did not produce an asset
    Failed,
}

/// Outcome of the last provider task run for a take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct GenerationResult {
    /// Provider task id
    provider_task_id: ProviderTaskId,
    /// Terminal status
    terminal_status: TerminalStatus,
    /// Stored asset on success
    asset_ref: Option<AssetRef>,
    /// Failure reason on failure
    error_reason: Option<String>,
}

impl GenerationResult {
    /// Successful result.
    pub fn succeeded(provider_task_id: ProviderTaskId, asset_ref: AssetRef) -> Self {
        Self {
            provider_task_id,
            terminal_status: TerminalStatus::Succeeded,
            asset_ref: Some(asset_ref),
            error_reason: None,
        }
    }

    /// Failed result.
    pub fn failed(provider_task_id: ProviderTaskId, reason: impl Into<String>) -> Self {
        Self {
            provider_task_id,
            terminal_status: TerminalStatus::Failed,
            asset_ref: None,
            error_reason: Some(reason.into()),
        }
    }
}
