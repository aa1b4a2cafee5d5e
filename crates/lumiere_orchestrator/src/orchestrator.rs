//! Batch orchestration of takes.

use crate::{
    AnchorArena, BackoffPolicy, OrchestratorConfig, ProviderSlot, ProviderStrategy, SubmitLimiter,
    TakeMachine, graph,
};
use futures::future::join_all;
use lumiere_cache::ResultCache;
use lumiere_core::{
    AssetMetadata, AssetRef, ContinuityAnchor, FailureReason, Fingerprint, GenerationRequest,
    GenerationResult, PollStatus, ProviderParams, ProviderTaskId, SubmitRequest, Take, TakeEvent,
    TakeId, TakeStatus, Timeline, TimelineEntry,
};
use lumiere_error::{
    LumiereError, LumiereErrorKind, LumiereResult, OrchestratorError, ProviderError,
    ProviderErrorKind, ProviderResult, RetryableError, ValidationError, ValidationErrorKind,
};
use lumiere_interface::{ExternalProvider, FrameExtractor};
use lumiere_ledger::{CreditLedger, ReservationId};
use lumiere_storage::AssetStore;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Semaphore, watch};
use tokio::time::Instant;

/// Terminal reason carried out of a take's happy path.
#[derive(Debug)]
struct Halt(FailureReason);

impl From<OrchestratorError> for Halt {
    fn from(err: OrchestratorError) -> Self {
        Halt(FailureReason::Internal(err.kind.to_string()))
    }
}

/// How one submission attempt ended.
#[derive(Debug)]
enum AttemptError {
    /// Worth another attempt
    Transient(String),
    /// The provider ran the task and reported failure
    TaskFailed(String),
    /// Ends the take
    Halt(Halt),
}

impl From<Halt> for AttemptError {
    fn from(halt: Halt) -> Self {
        AttemptError::Halt(halt)
    }
}

impl From<OrchestratorError> for AttemptError {
    fn from(err: OrchestratorError) -> Self {
        AttemptError::Halt(err.into())
    }
}

/// Shared state for one call to `run`.
struct Batch {
    permits: Arc<Semaphore>,
    anchors: AnchorArena,
    needs_anchor: HashSet<TakeId>,
}

/// Bookkeeping for one take while it runs.
struct TakeRun {
    take: Take,
    machine: TakeMachine,
    fingerprint: Option<Fingerprint>,
    reservation: Option<ReservationId>,
    provider: Option<String>,
    result: Option<GenerationResult>,
    cache_hit: bool,
    charged: u64,
}

impl TakeRun {
    fn new(take: Take, events: Option<UnboundedSender<TakeEvent>>) -> Self {
        let machine = TakeMachine::new(*take.id(), *take.index(), events);
        Self {
            take,
            machine,
            fingerprint: None,
            reservation: None,
            provider: None,
            result: None,
            cache_hit: false,
            charged: 0,
        }
    }

    fn step(&mut self, to: TakeStatus) -> Result<(), OrchestratorError> {
        self.machine.advance(to)
    }
}

/// Drives takes from `Pending` to `Committed` or `Failed`.
///
/// Independent takes run concurrently up to the concurrency budget. Takes
/// linked by `depends_on` form chains that run in order; each link waits for
/// its predecessor's continuity anchor, and a failed link short-circuits the
/// rest of its chain. Credits are reserved before the first submission and
/// either committed once on success or released on failure.
///
/// Per-take failures never abort the batch. They are reported in the
/// returned [`Timeline`].
pub struct GenerationOrchestrator {
    providers: ProviderStrategy,
    ledger: Arc<CreditLedger>,
    cache: Arc<ResultCache>,
    store: Arc<dyn AssetStore>,
    extractor: Arc<dyn FrameExtractor>,
    config: OrchestratorConfig,
    backoff: BackoffPolicy,
    generation: ProviderParams,
    limiter: Option<SubmitLimiter>,
    events: Option<UnboundedSender<TakeEvent>>,
    cancel: watch::Sender<bool>,
}

impl std::fmt::Debug for GenerationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationOrchestrator")
            .field("providers", &self.providers)
            .field("config", &self.config)
            .field("backoff", &self.backoff)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl GenerationOrchestrator {
    /// Create an orchestrator with default settings.
    pub fn new(
        providers: ProviderStrategy,
        ledger: Arc<CreditLedger>,
        cache: Arc<ResultCache>,
        store: Arc<dyn AssetStore>,
        extractor: Arc<dyn FrameExtractor>,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            providers,
            ledger,
            cache,
            store,
            extractor,
            config: OrchestratorConfig::default(),
            backoff: BackoffPolicy::default(),
            generation: ProviderParams::default(),
            limiter: None,
            events: None,
            cancel,
        }
    }

    /// Replace batch settings; also sets the submission quota.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.limiter = SubmitLimiter::per_minute(*config.submissions_per_minute());
        self.config = config;
        self
    }

    /// Replace the timing policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Parameters applied to every request; duration is set per take.
    pub fn with_generation_params(mut self, params: ProviderParams) -> Self {
        self.generation = params;
        self
    }

    /// Forward every state transition to `events`.
    pub fn with_events(mut self, events: UnboundedSender<TakeEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Batch settings.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Timing policy.
    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Ledger charged by this orchestrator.
    pub fn ledger(&self) -> &Arc<CreditLedger> {
        &self.ledger
    }

    /// Cache consulted by this orchestrator.
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Ask the running batch to stop.
    ///
    /// Takes that have not reached a terminal state stop at their next
    /// checkpoint: before reserving, before submitting, or while waiting
    /// between polls. Outstanding provider tasks are cancelled on a best
    /// effort basis and their reservations released.
    ///
    /// A request made while no batch is running applies to the next batch.
    /// The flag clears once a batch finishes.
    pub fn cancel(&self) {
        tracing::info!("Cancellation requested");
        self.cancel.send_replace(true);
    }

    /// Whether cancellation is pending for the current or next batch.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Run a batch of takes.
    ///
    /// # Errors
    ///
    /// Returns a validation error, before any credits are touched, when the
    /// concurrency budget is zero, the settings are out of range, or the take
    /// graph is not a set of simple chains. Failures of individual takes are
    /// reported in the timeline instead.
    #[tracing::instrument(skip(self, takes), fields(takes = takes.len()))]
    pub async fn run(&self, takes: Vec<Take>, concurrency_budget: usize) -> LumiereResult<Timeline> {
        if concurrency_budget == 0 {
            return Err(ValidationError::new(ValidationErrorKind::InvalidConcurrency(0)).into());
        }
        self.config.validate()?;
        self.backoff.validate()?;
        self.generation.validate()?;
        let chains = graph::split_chains(takes)?;
        let needs_anchor = graph::with_dependents(&chains);

        if self.is_cancelled() {
            tracing::info!("Batch cancelled before it started");
        }
        let batch = Batch {
            permits: Arc::new(Semaphore::new(concurrency_budget)),
            anchors: AnchorArena::new(),
            needs_anchor,
        };

        tracing::info!(chains = chains.len(), "Starting batch");
        let entries: Vec<TimelineEntry> = join_all(
            chains
                .into_iter()
                .map(|chain| self.run_chain(chain, &batch)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();
        self.cancel.send_replace(false);

        let timeline = Timeline::new(entries);
        tracing::info!(
            committed = timeline.committed_count(),
            failed = timeline.failed_count(),
            credits = timeline.total_credits(),
            "Batch finished"
        );
        Ok(timeline)
    }

    async fn run_chain(&self, chain: Vec<Take>, batch: &Batch) -> Vec<TimelineEntry> {
        let mut entries = Vec::with_capacity(chain.len());
        let mut predecessor_failed = false;
        for take in chain {
            let entry = if predecessor_failed {
                let run = TakeRun::new(take, self.events.clone());
                self.fail(run, FailureReason::DependencyFailed).await
            } else {
                self.run_take(take, batch).await
            };
            predecessor_failed = !entry.is_committed();
            entries.push(entry);
        }
        entries
    }

    #[tracing::instrument(skip(self, take, batch), fields(take = %take.id(), index = take.index()))]
    async fn run_take(&self, take: Take, batch: &Batch) -> TimelineEntry {
        let mut run = TakeRun::new(take, self.events.clone());
        let permit = batch.permits.clone().acquire_owned().await;
        let mut cancel = self.cancel.subscribe();

        let outcome = match permit {
            Ok(_permit) => self.drive(&mut run, batch, &mut cancel).await,
            Err(_) => Err(Halt(FailureReason::Cancelled)),
        };

        match outcome {
            Ok((fingerprint, asset)) => self.finish(run, fingerprint, asset),
            Err(Halt(reason)) => self.fail(run, reason).await,
        }
    }

    fn finish(&self, mut run: TakeRun, fingerprint: Fingerprint, asset: AssetRef) -> TimelineEntry {
        if let Err(e) = run.step(TakeStatus::Committed) {
            tracing::error!(error = %e, "Could not mark take committed");
        }
        tracing::info!(
            take = %run.take.id(),
            index = run.take.index(),
            cache_hit = run.cache_hit,
            attempts = run.machine.attempt(),
            credits = run.charged,
            "Take committed"
        );
        let attempts = run.machine.attempt();
        TimelineEntry::committed(
            run.take,
            asset,
            fingerprint,
            run.cache_hit,
            attempts,
            run.provider,
            run.charged,
            run.result,
            run.machine.into_history(),
        )
    }

    async fn fail(&self, mut run: TakeRun, reason: FailureReason) -> TimelineEntry {
        if run.machine.status() != TakeStatus::Failed {
            if let Err(e) = run.step(TakeStatus::Failed) {
                tracing::error!(error = %e, "Could not mark take failed");
            }
        }
        if let Some(reservation) = run.reservation.take() {
            if let Err(e) = run.step(TakeStatus::RolledBack) {
                tracing::error!(error = %e, "Could not mark take rolled back");
            }
            if let Err(e) = self.ledger.release(reservation).await {
                tracing::error!(error = %e, reservation = %reservation, "Reservation release failed");
            }
            if let Err(e) = run.step(TakeStatus::Failed) {
                tracing::error!(error = %e, "Could not mark take failed");
            }
        }
        tracing::warn!(
            take = %run.take.id(),
            index = run.take.index(),
            reason = %reason,
            attempts = run.machine.attempt(),
            "Take failed"
        );
        let attempts = run.machine.attempt();
        TimelineEntry::failed(
            run.take,
            reason,
            run.fingerprint,
            attempts,
            run.provider,
            run.charged,
            run.result,
            run.machine.into_history(),
        )
    }

    /// Everything between `Pending` and `Committed`.
    async fn drive(
        &self,
        run: &mut TakeRun,
        batch: &Batch,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(Fingerprint, AssetRef), Halt> {
        checkpoint(cancel)?;

        let (seed_ref, seed_image) = match *run.take.depends_on() {
            Some(predecessor) => {
                let anchor = batch
                    .anchors
                    .take(&predecessor)
                    .await
                    .ok_or(Halt(FailureReason::DependencyFailed))?;
                let bytes = self
                    .store
                    .get(anchor.image_ref())
                    .await
                    .map_err(|e| Halt(FailureReason::Storage(e.to_string())))?;
                (Some(anchor.image_ref().clone()), Some(bytes))
            }
            None => (None, None),
        };

        let params = self
            .generation
            .clone()
            .with_duration_secs(run.take.target_duration().target_secs());
        params
            .validate()
            .map_err(|e| Halt(FailureReason::InvalidRequest(e.kind.to_string())))?;
        let request = GenerationRequest::new(
            run.take.text().clone(),
            self.providers.primary_name(),
            params,
            seed_ref,
        );
        let fingerprint = request.fingerprint().clone();
        run.fingerprint = Some(fingerprint.clone());

        run.step(TakeStatus::CacheCheck)?;
        if let Some(asset) = self.cached_asset(&fingerprint).await {
            run.step(TakeStatus::CacheHit)?;
            run.cache_hit = true;
            tracing::debug!(fingerprint = %fingerprint, "Cache hit");
            self.publish_anchor(run, batch, &asset).await?;
            return Ok((fingerprint, asset));
        }
        run.step(TakeStatus::CacheMiss)?;
        checkpoint(cancel)?;

        run.step(TakeStatus::Reserving)?;
        let cost = *request.estimate_cost().credits();
        let reservation = self.ledger.reserve(cost).await.map_err(budget_failure)?;
        run.reservation = Some(reservation);

        let submit = SubmitRequest::new(
            request.prompt().clone(),
            request.provider_params().clone(),
            seed_image,
        );
        let (task_id, asset) = self.generate(run, &submit, cancel).await?;

        run.charged = self
            .ledger
            .commit(reservation)
            .await
            .map_err(|e| Halt(FailureReason::Ledger(e.to_string())))?;
        run.reservation = None;
        self.cache.put(fingerprint.clone(), asset.clone()).await;
        run.result = Some(GenerationResult::succeeded(task_id, asset.clone()));

        self.publish_anchor(run, batch, &asset).await?;
        Ok((fingerprint, asset))
    }

    /// Extract and store the continuity frame when a dependent is waiting.
    /// Cached clip for `fingerprint`, if its bytes are still in the store.
    ///
    /// An entry whose asset is gone or unreadable is purged and treated as a miss.
    async fn cached_asset(&self, fingerprint: &Fingerprint) -> Option<AssetRef> {
        let asset = self.cache.get(fingerprint).await?;
        match self.store.exists(&asset).await {
            Ok(true) => Some(asset),
            Ok(false) => {
                tracing::warn!(fingerprint = %fingerprint, location = %asset.location, "Cached asset missing from store, regenerating");
                self.cache.purge(fingerprint).await;
                None
            }
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Cached asset unreadable, regenerating");
                self.cache.purge(fingerprint).await;
                None
            }
        }
    }

    async fn publish_anchor(
        &self,
        run: &mut TakeRun,
        batch: &Batch,
        asset: &AssetRef,
    ) -> Result<(), Halt> {
        if !batch.needs_anchor.contains(run.take.id()) {
            return Ok(());
        }
        run.step(TakeStatus::ExtractingAnchor)?;
        let frame = self
            .extractor
            .extract(asset, *self.config.anchor_time_fraction())
            .await
            .map_err(|e| Halt(FailureReason::AnchorExtraction(e.to_string())))?;
        let image_ref = self
            .store
            .put(&frame, &AssetMetadata::frame())
            .await
            .map_err(|e| Halt(FailureReason::AnchorExtraction(e.to_string())))?;
        tracing::debug!(
            take = %run.take.id(),
            frame = %image_ref.content_hash,
            "Continuity anchor stored"
        );
        batch
            .anchors
            .insert(ContinuityAnchor::new(*run.take.id(), image_ref))
            .await;
        Ok(())
    }

    /// Submission attempts with retry and fallback.
    async fn generate(
        &self,
        run: &mut TakeRun,
        submit: &SubmitRequest,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(ProviderTaskId, AssetRef), Halt> {
        let deadline = Instant::now() + self.backoff.take_timeout();
        let mut slot = ProviderSlot::Primary;
        let mut consecutive_failures = 0;

        loop {
            run.step(TakeStatus::Submitting)?;
            let provider = Arc::clone(self.providers.provider(slot));
            run.provider = Some(provider.provider_name().to_string());
            let attempt = run.machine.attempt();
            tracing::debug!(attempt, provider = %provider.provider_name(), slot = %slot, "Submitting");

            let message = match self
                .attempt(run, provider.as_ref(), submit, deadline, cancel)
                .await
            {
                Ok(done) => return Ok(done),
                Err(AttemptError::Halt(halt)) => return Err(halt),
                Err(AttemptError::Transient(message)) => message,
                Err(AttemptError::TaskFailed(reason)) => format!("task failed: {}", reason),
            };

            run.step(TakeStatus::Failed)?;
            consecutive_failures += 1;
            if attempt >= *self.backoff.max_attempts() {
                return Err(Halt(FailureReason::RetriesExhausted {
                    attempts: attempt,
                    last_error: message,
                }));
            }
            tracing::info!(attempt, error = %message, "Attempt failed, will retry");
            self.pause(self.backoff.retry_delay(attempt), deadline, cancel)
                .await?;

            let next = self.providers.next_slot(
                slot,
                consecutive_failures,
                *self.backoff.fallback_after(),
            );
            if next != slot {
                tracing::warn!(consecutive_failures, "Switching to fallback provider");
                run.step(TakeStatus::FallbackProvider)?;
                slot = next;
            } else {
                run.step(TakeStatus::Retrying)?;
            }
        }
    }

    /// One submit, poll and download cycle.
    async fn attempt(
        &self,
        run: &mut TakeRun,
        provider: &dyn ExternalProvider,
        submit: &SubmitRequest,
        deadline: Instant,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(ProviderTaskId, AssetRef), AttemptError> {
        checkpoint(cancel)?;
        if let Some(limiter) = &self.limiter {
            tokio::select! {
                _ = limiter.until_ready() => {}
                _ = cancel.wait_for(|cancelled| *cancelled) => {
                    return Err(Halt(FailureReason::Cancelled).into());
                }
            }
        }

        let task_id = self
            .call(provider.submit(submit))
            .await
            .map_err(classify)?;
        run.step(TakeStatus::Polling)?;

        let asset_url = match self.poll_until_done(provider, &task_id, deadline, cancel).await {
            Ok(url) => url,
            Err(AttemptError::TaskFailed(reason)) => {
                run.result = Some(GenerationResult::failed(task_id.clone(), reason.clone()));
                return Err(AttemptError::TaskFailed(reason));
            }
            Err(other) => return Err(other),
        };
        run.step(TakeStatus::Succeeded)?;

        let bytes = self
            .call(provider.download(&asset_url))
            .await
            .map_err(classify)?;
        let asset = self
            .store
            .put(&bytes, &AssetMetadata::clip())
            .await
            .map_err(|e| Halt(FailureReason::Storage(e.to_string())))?;
        tracing::debug!(task_id = %task_id, asset = %asset.content_hash, "Clip stored");
        Ok((task_id, asset))
    }

    async fn poll_until_done(
        &self,
        provider: &dyn ExternalProvider,
        task_id: &ProviderTaskId,
        deadline: Instant,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<String, AttemptError> {
        let submitted_at = Instant::now();
        let mut polls = 0;
        loop {
            if let Err(halt) = self
                .pause(self.backoff.poll_delay(polls), deadline, cancel)
                .await
            {
                self.abandon(provider, task_id).await;
                return Err(halt.into());
            }
            polls += 1;

            match self.call(provider.poll(task_id)).await {
                Ok(PollStatus::Succeeded { asset_url }) => return Ok(asset_url),
                Ok(PollStatus::Failed { reason }) => return Err(AttemptError::TaskFailed(reason)),
                Ok(PollStatus::Waiting) => {
                    tracing::trace!(task_id = %task_id, polls, "Task waiting");
                }
                Ok(PollStatus::Processing { progress }) => {
                    tracing::trace!(task_id = %task_id, polls, ?progress, "Task processing");
                }
                Err(e) if e.is_not_found() => {
                    if submitted_at.elapsed() >= self.backoff.not_found_grace() {
                        tracing::warn!(task_id = %task_id, polls, "Task still unknown after grace window");
                        return Err(Halt(FailureReason::TaskNotFound(e.kind.to_string())).into());
                    }
                    tracing::debug!(task_id = %task_id, polls, "Task not indexed yet");
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(task_id = %task_id, error = %e.kind, "Poll failed, polling again");
                }
                Err(e) => {
                    return Err(Halt(FailureReason::ProviderPermanent(e.kind.to_string())).into());
                }
            }
        }
    }

    /// Sleep for `delay`, bounded by the take deadline and cancellation.
    async fn pause(
        &self,
        delay: Duration,
        deadline: Instant,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), Halt> {
        let timed_out = Halt(FailureReason::TimedOut(self.backoff.take_timeout().as_secs()));
        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out);
        }
        let wait = delay.min(deadline - now);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.wait_for(|cancelled| *cancelled) => {
                return Err(Halt(FailureReason::Cancelled));
            }
        }
        if wait < delay {
            return Err(timed_out);
        }
        Ok(())
    }

    async fn abandon(&self, provider: &dyn ExternalProvider, task_id: &ProviderTaskId) {
        if let Err(e) = self.call(provider.cancel(task_id)).await {
            tracing::warn!(task_id = %task_id, error = %e.kind, "Provider cancel failed");
        }
    }

    async fn call<T>(&self, call: impl Future<Output = ProviderResult<T>>) -> ProviderResult<T> {
        let limit = self.backoff.call_timeout();
        tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
            Err(ProviderError::new(ProviderErrorKind::Timeout(format!(
                "no response within {}ms",
                limit.as_millis()
            ))))
        })
    }
}

fn checkpoint(cancel: &watch::Receiver<bool>) -> Result<(), Halt> {
    if *cancel.borrow() {
        Err(Halt(FailureReason::Cancelled))
    } else {
        Ok(())
    }
}

fn classify(err: ProviderError) -> AttemptError {
    if err.is_retryable() {
        AttemptError::Transient(err.kind.to_string())
    } else {
        AttemptError::Halt(Halt(FailureReason::ProviderPermanent(err.kind.to_string())))
    }
}

fn budget_failure(err: LumiereError) -> Halt {
    match err.kind() {
        LumiereErrorKind::Ledger(ledger) if ledger.is_budget() => {
            Halt(FailureReason::InsufficientBudget(ledger.kind.to_string()))
        }
        _ => Halt(FailureReason::Ledger(err.to_string())),
    }
}
