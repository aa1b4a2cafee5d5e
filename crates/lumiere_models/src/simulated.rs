//! Deterministic in-process provider and frame extractor.
//!
//! Outcomes are scripted per prompt substring, so orchestration behavior
//! (retries, fallback, not-found lag, task failure) can be exercised without
//! a network. Every submission is recorded for inspection.

use async_trait::async_trait;
use lumiere_core::{AssetRef, PollStatus, ProviderParams, ProviderTaskId, SubmitRequest};
use lumiere_error::{
    FrameError, FrameErrorKind, LumiereResult, ProviderError, ProviderErrorKind, ProviderResult,
};
use lumiere_interface::{ExternalProvider, FrameExtractor};
use lumiere_storage::AssetStore;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// What a simulated submission does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Task completes after the configured number of processing polls
    Succeed,
    /// Submit fails with a 503
    SubmitTransient(String),
    /// Submit is rejected as unauthorized
    SubmitPermanent(String),
    /// Submit succeeds but the task ends in failure
    TaskFailure(String),
    /// Polls report "not found" this many times, then the task succeeds
    NotFoundFor(u32),
    /// Task never leaves processing
    NeverFinishes,
}

/// One call to [`SimulatedProvider::submit`].
#[derive(Debug, Clone, PartialEq, derive_getters::Getters)]
pub struct SubmissionRecord {
    /// Task id handed out, if the submit was accepted
    task_id: Option<ProviderTaskId>,
    /// Prompt text
    prompt: String,
    /// Parameters sent
    params: ProviderParams,
    /// Seed image bytes sent
    seed_image: Option<Vec<u8>>,
}

#[derive(Debug)]
struct SimulatedTask {
    outcome: ScriptedOutcome,
    polls: u32,
    clip: Vec<u8>,
}

#[derive(Debug, Default)]
struct SimulatedState {
    rules: Vec<(String, VecDeque<ScriptedOutcome>)>,
    submissions: Vec<SubmissionRecord>,
    tasks: HashMap<String, SimulatedTask>,
    downloads: HashMap<String, Vec<u8>>,
    cancelled: Vec<ProviderTaskId>,
    polls: usize,
    next_id: u64,
}

/// Scripted video provider.
///
/// Prompts matching a rule consume that rule's outcomes in order, one per
/// submission; once a rule is exhausted (or no rule matches) submissions
/// succeed. Generated clip bytes depend on the provider name, prompt and seed
/// image, so distinct requests yield distinct assets.
///
/// # Examples
///
/// ```
/// use lumiere_models::{ScriptedOutcome, SimulatedProvider};
///
/// let provider = SimulatedProvider::new("sim").with_outcomes(
///     "storm",
///     vec![
///         ScriptedOutcome::TaskFailure("gpu lost".to_string()),
///         ScriptedOutcome::Succeed,
///     ],
/// );
/// ```
#[derive(Debug)]
pub struct SimulatedProvider {
    name: String,
    processing_polls: u32,
    state: Mutex<SimulatedState>,
}

impl SimulatedProvider {
    /// Create a provider where every submission succeeds on first poll.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processing_polls: 0,
            state: Mutex::new(SimulatedState::default()),
        }
    }

    /// Script outcomes for prompts containing `pattern`.
    pub fn with_outcomes(
        mut self,
        pattern: impl Into<String>,
        outcomes: Vec<ScriptedOutcome>,
    ) -> Self {
        self.state
            .get_mut()
            .rules
            .push((pattern.into(), outcomes.into()));
        self
    }

    /// Report `polls` processing polls before a task completes.
    pub fn with_processing_polls(mut self, polls: u32) -> Self {
        self.processing_polls = polls;
        self
    }

    /// Every submission so far, in order.
    pub async fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state.lock().await.submissions.clone()
    }

    /// Number of submit calls.
    pub async fn submit_count(&self) -> usize {
        self.state.lock().await.submissions.len()
    }

    /// Number of submit calls whose prompt contains `pattern`.
    pub async fn submit_count_for(&self, pattern: &str) -> usize {
        self.state
            .lock()
            .await
            .submissions
            .iter()
            .filter(|s| s.prompt.contains(pattern))
            .count()
    }

    /// Number of poll calls.
    pub async fn poll_count(&self) -> usize {
        self.state.lock().await.polls
    }

    /// Tasks cancelled through [`ExternalProvider::cancel`].
    pub async fn cancelled(&self) -> Vec<ProviderTaskId> {
        self.state.lock().await.cancelled.clone()
    }

    fn clip_bytes(&self, request: &SubmitRequest) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update([0]);
        hasher.update(request.prompt().as_bytes());
        hasher.update([0]);
        if let Some(seed) = request.seed_image() {
            hasher.update(seed);
        }
        let mut clip = b"SIMCLIP\0".to_vec();
        clip.extend_from_slice(&hasher.finalize());
        clip
    }
}

#[async_trait]
impl ExternalProvider for SimulatedProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<ProviderTaskId> {
        let mut state = self.state.lock().await;
        let outcome = state
            .rules
            .iter_mut()
            .find(|(pattern, _)| request.prompt().contains(pattern.as_str()))
            .and_then(|(_, outcomes)| outcomes.pop_front())
            .unwrap_or(ScriptedOutcome::Succeed);

        let rejection = match &outcome {
            ScriptedOutcome::SubmitTransient(message) => {
                Some(ProviderError::from_status(503, message.clone()))
            }
            ScriptedOutcome::SubmitPermanent(message) => Some(ProviderError::new(
                ProviderErrorKind::Unauthorized(message.clone()),
            )),
            _ => None,
        };

        let mut record = SubmissionRecord {
            task_id: None,
            prompt: request.prompt().clone(),
            params: request.params().clone(),
            seed_image: request.seed_image().clone(),
        };

        if let Some(error) = rejection {
            state.submissions.push(record);
            tracing::debug!(provider = %self.name, error = %error, "Simulated submit rejected");
            return Err(error);
        }

        state.next_id += 1;
        let task_id = ProviderTaskId::from(format!("{}-task-{}", self.name, state.next_id));
        record.task_id = Some(task_id.clone());
        state.submissions.push(record);
        state.tasks.insert(
            task_id.as_str().to_string(),
            SimulatedTask {
                outcome,
                polls: 0,
                clip: self.clip_bytes(request),
            },
        );
        tracing::debug!(provider = %self.name, task_id = %task_id, "Simulated submit accepted");
        Ok(task_id)
    }

    async fn poll(&self, task_id: &ProviderTaskId) -> ProviderResult<PollStatus> {
        let processing_polls = self.processing_polls;
        let name = self.name.clone();
        let mut state = self.state.lock().await;
        state.polls += 1;

        if state.cancelled.contains(task_id) {
            return Err(ProviderError::new(ProviderErrorKind::Cancelled(format!(
                "task {} was cancelled",
                task_id
            ))));
        }

        let task = state.tasks.get_mut(task_id.as_str()).ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::NotFound(format!("unknown task {}", task_id)))
        })?;
        let poll = task.polls;
        task.polls += 1;

        let settled_after = match &task.outcome {
            ScriptedOutcome::NotFoundFor(n) if poll < *n => {
                return Err(ProviderError::new(ProviderErrorKind::NotFound(format!(
                    "task {} not indexed yet",
                    task_id
                ))));
            }
            ScriptedOutcome::NotFoundFor(n) => *n + processing_polls,
            ScriptedOutcome::TaskFailure(reason) => {
                return Ok(PollStatus::Failed {
                    reason: reason.clone(),
                });
            }
            ScriptedOutcome::NeverFinishes => {
                return Ok(PollStatus::Processing { progress: None });
            }
            _ => processing_polls,
        };

        if poll < settled_after {
            return Ok(PollStatus::Processing {
                progress: Some((poll + 1) as f32 / (settled_after + 1) as f32),
            });
        }

        let clip = task.clip.clone();
        let asset_url = format!("sim://{}/{}", name, task_id);
        state.downloads.insert(asset_url.clone(), clip);
        Ok(PollStatus::Succeeded { asset_url })
    }

    async fn download(&self, asset_url: &str) -> ProviderResult<Vec<u8>> {
        self.state
            .lock()
            .await
            .downloads
            .get(asset_url)
            .cloned()
            .ok_or_else(|| {
                ProviderError::new(ProviderErrorKind::NotFound(format!(
                    "no asset at {}",
                    asset_url
                )))
            })
    }

    async fn cancel(&self, task_id: &ProviderTaskId) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.tasks.remove(task_id.as_str());
        state.cancelled.push(task_id.clone());
        tracing::debug!(provider = %self.name, task_id = %task_id, "Simulated task cancelled");
        Ok(())
    }
}

/// Frame extractor that derives frame bytes from the asset content.
///
/// The same asset and fraction always produce the same bytes, which makes
/// continuity checks exact without decoding video.
pub struct DigestFrameExtractor {
    store: Arc<dyn AssetStore>,
}

impl std::fmt::Debug for DigestFrameExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestFrameExtractor").finish_non_exhaustive()
    }
}

impl DigestFrameExtractor {
    /// Create an extractor reading assets from `store`.
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FrameExtractor for DigestFrameExtractor {
    async fn extract(&self, asset: &AssetRef, time_fraction: f64) -> LumiereResult<Vec<u8>> {
        if !(0.0..=1.0).contains(&time_fraction) {
            return Err(
                FrameError::new(FrameErrorKind::InvalidFraction(time_fraction.to_string())).into(),
            );
        }
        let clip = self.store.get(asset).await?;

        let mut hasher = Sha256::new();
        hasher.update(&clip);
        hasher.update(time_fraction.to_be_bytes());
        let mut frame = b"SIMFRAME".to_vec();
        frame.extend_from_slice(&hasher.finalize());
        Ok(frame)
    }
}
