//! Tests for batch orchestration against the simulated provider.

use async_trait::async_trait;
use lumiere_cache::ResultCache;
use lumiere_core::{
    DurationRange, FailureReason, PollStatus, ProviderTaskId, SubmitRequest, Take, TakeStatus,
    Timeline, TimelineEntry,
};
use lumiere_error::{LumiereErrorKind, ProviderResult, ValidationErrorKind};
use lumiere_interface::{ExternalProvider, FrameExtractor};
use lumiere_ledger::CreditLedger;
use lumiere_models::{DigestFrameExtractor, ScriptedOutcome, SimulatedProvider};
use lumiere_orchestrator::{BackoffPolicy, GenerationOrchestrator, ProviderStrategy};
use lumiere_storage::{AssetStore, MemoryAssetStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Credits reserved for one take built by [`take`]: 6s at 30 credits/minute.
const TAKE_COST: u64 = 3;

fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy::default()
        .with_poll_initial_ms(1)
        .with_poll_max_ms(4)
        .with_retry_delay_ms(1)
        .with_not_found_grace_ms(2_000)
        .with_take_timeout_ms(5_000)
        .with_call_timeout_ms(1_000)
}

fn take(index: usize, text: &str) -> Take {
    Take::new(index, text, DurationRange::new(2.0, 6.0))
}

fn chain(texts: &[&str]) -> Vec<Take> {
    let mut takes: Vec<Take> = Vec::new();
    for (index, text) in texts.iter().enumerate() {
        let next = match takes.last() {
            Some(previous) => take(index, text).with_dependency(*previous.id()),
            None => take(index, text),
        };
        takes.push(next);
    }
    takes
}

fn entry(timeline: &Timeline, index: usize) -> &TimelineEntry {
    timeline.entry(index).expect("Entry for every take")
}

fn failure(timeline: &Timeline, index: usize) -> FailureReason {
    entry(timeline, index)
        .failure()
        .clone()
        .expect("Take should have failed")
}

struct Fixture {
    provider: Arc<SimulatedProvider>,
    ledger: Arc<CreditLedger>,
    cache: Arc<ResultCache>,
    store: Arc<dyn AssetStore>,
}

impl Fixture {
    fn new(provider: SimulatedProvider, balance: u64) -> Self {
        Self {
            provider: Arc::new(provider),
            ledger: Arc::new(CreditLedger::new(balance)),
            cache: Arc::new(ResultCache::in_memory()),
            store: Arc::new(MemoryAssetStore::new()),
        }
    }

    fn strategy(&self) -> ProviderStrategy {
        ProviderStrategy::new(self.provider.clone())
    }

    fn orchestrator_with(&self, strategy: ProviderStrategy) -> GenerationOrchestrator {
        GenerationOrchestrator::new(
            strategy,
            self.ledger.clone(),
            self.cache.clone(),
            self.store.clone(),
            Arc::new(DigestFrameExtractor::new(self.store.clone())),
        )
        .with_backoff(fast_backoff())
    }

    fn orchestrator(&self) -> GenerationOrchestrator {
        self.orchestrator_with(self.strategy())
    }
}

#[tokio::test]
async fn test_transient_failures_retry_then_commit() {
    let fixture = Fixture::new(
        SimulatedProvider::new("sim").with_outcomes(
            "storm",
            vec![
                ScriptedOutcome::TaskFailure("gpu lost".to_string()),
                ScriptedOutcome::TaskFailure("gpu lost".to_string()),
            ],
        ),
        100,
    );

    let timeline = fixture
        .orchestrator()
        .run(vec![take(0, "A storm rolls in.")], 1)
        .await
        .unwrap();

    let entry = entry(&timeline, 0);
    assert!(entry.is_committed());
    assert_eq!(*entry.attempts(), 3);
    assert_eq!(*entry.credits_charged(), TAKE_COST);
    assert_eq!(fixture.provider.submit_count().await, 3);
    assert!(entry.transitions().contains(&TakeStatus::Retrying));

    let snapshot = fixture.ledger.snapshot().await;
    assert_eq!(*snapshot.committed(), TAKE_COST);
    assert_eq!(*snapshot.reserved(), 0);
}

#[tokio::test]
async fn test_exhausted_retries_release_reservation() {
    let fixture = Fixture::new(
        SimulatedProvider::new("sim").with_outcomes(
            "storm",
            vec![ScriptedOutcome::TaskFailure("gpu lost".to_string()); 3],
        ),
        100,
    );

    let timeline = fixture
        .orchestrator()
        .run(vec![take(0, "A storm rolls in.")], 1)
        .await
        .unwrap();

    assert!(matches!(
        failure(&timeline, 0),
        FailureReason::RetriesExhausted { attempts: 3, .. }
    ));
    let transitions = entry(&timeline, 0).transitions();
    assert_eq!(
        &transitions[transitions.len() - 2..],
        &[TakeStatus::RolledBack, TakeStatus::Failed]
    );
    assert_eq!(fixture.ledger.available().await, 100);
    assert_eq!(*fixture.ledger.snapshot().await.committed(), 0);
    assert!(entry(&timeline, 0).result().is_some());
}

#[tokio::test]
async fn test_insufficient_budget_never_reaches_provider() {
    let fixture = Fixture::new(SimulatedProvider::new("sim"), TAKE_COST - 1);

    let timeline = fixture
        .orchestrator()
        .run(vec![take(0, "An expensive sunrise.")], 1)
        .await
        .unwrap();

    assert!(matches!(
        failure(&timeline, 0),
        FailureReason::InsufficientBudget(_)
    ));
    assert_eq!(*entry(&timeline, 0).attempts(), 0);
    assert_eq!(fixture.provider.submit_count().await, 0);
    assert_eq!(fixture.provider.poll_count().await, 0);
    assert_eq!(fixture.ledger.available().await, TAKE_COST - 1);
}

#[tokio::test]
async fn test_budget_runs_out_mid_batch() {
    let fixture = Fixture::new(SimulatedProvider::new("sim"), TAKE_COST * 2);
    let takes = vec![take(0, "One."), take(1, "Two."), take(2, "Three.")];

    let timeline = fixture.orchestrator().run(takes, 1).await.unwrap();

    assert_eq!(timeline.committed_count(), 2);
    assert_eq!(timeline.failed_count(), 1);
    assert_eq!(timeline.total_credits(), TAKE_COST * 2);
    assert_eq!(fixture.provider.submit_count().await, 2);
    assert_eq!(fixture.ledger.available().await, 0);
}

#[tokio::test]
async fn test_chain_short_circuits_after_failure() {
    let fixture = Fixture::new(
        SimulatedProvider::new("sim").with_outcomes(
            "third",
            vec![ScriptedOutcome::SubmitPermanent("content policy".to_string())],
        ),
        100,
    );
    let takes = chain(&[
        "The first shot.",
        "The second shot.",
        "The third shot.",
        "The fourth shot.",
        "The fifth shot.",
    ]);

    let timeline = fixture.orchestrator().run(takes, 5).await.unwrap();

    assert!(entry(&timeline, 0).is_committed());
    assert!(entry(&timeline, 1).is_committed());
    assert!(matches!(
        failure(&timeline, 2),
        FailureReason::ProviderPermanent(_)
    ));
    for index in 3..5 {
        assert_eq!(failure(&timeline, index), FailureReason::DependencyFailed);
        assert_eq!(
            entry(&timeline, index).transitions(),
            &[TakeStatus::Pending, TakeStatus::Failed]
        );
        assert_eq!(*entry(&timeline, index).credits_charged(), 0);
    }
    assert_eq!(fixture.provider.submit_count().await, 3);

    let snapshot = fixture.ledger.snapshot().await;
    assert_eq!(*snapshot.committed(), TAKE_COST * 2);
    assert_eq!(*snapshot.reserved(), 0);
}

#[tokio::test]
async fn test_independent_failure_is_isolated() {
    let fixture = Fixture::new(
        SimulatedProvider::new("sim").with_outcomes(
            "cursed",
            vec![ScriptedOutcome::SubmitPermanent("rejected".to_string())],
        ),
        100,
    );
    let takes = vec![
        take(0, "A calm lake."),
        take(1, "A rocky shore."),
        take(2, "A cursed mirror."),
        take(3, "A quiet forest."),
        take(4, "A distant mountain."),
    ];

    let timeline = fixture.orchestrator().run(takes, 5).await.unwrap();

    for index in [0, 1, 3, 4] {
        assert!(entry(&timeline, index).is_committed());
    }
    assert!(matches!(
        failure(&timeline, 2),
        FailureReason::ProviderPermanent(_)
    ));
    assert_eq!(fixture.provider.submit_count_for("cursed").await, 1);
    assert_eq!(timeline.total_credits(), TAKE_COST * 4);
    assert_eq!(*fixture.ledger.snapshot().await.reserved(), 0);
}

#[tokio::test]
async fn test_seed_image_matches_predecessor_frame() {
    let fixture = Fixture::new(SimulatedProvider::new("sim"), 100);
    let takes = chain(&["Door opens.", "Hero steps through.", "Light floods in."]);

    let timeline = fixture.orchestrator().run(takes, 3).await.unwrap();
    assert!(timeline.is_complete());

    let submissions = fixture.provider.submissions().await;
    assert_eq!(submissions.len(), 3);
    assert!(submissions[0].seed_image().is_none());

    let extractor = DigestFrameExtractor::new(fixture.store.clone());
    for index in 1..3 {
        let predecessor = entry(&timeline, index - 1)
            .asset()
            .clone()
            .expect("Committed take has an asset");
        let expected = extractor.extract(&predecessor, 1.0).await.unwrap();
        assert_eq!(submissions[index].seed_image().as_ref(), Some(&expected));
    }
}

#[tokio::test]
async fn test_rerun_is_served_from_cache() {
    let fixture = Fixture::new(SimulatedProvider::new("sim"), 100);
    let texts = ["Door opens.", "Hero steps through."];

    let first = fixture.orchestrator().run(chain(&texts), 2).await.unwrap();
    assert!(first.is_complete());
    let spent = *fixture.ledger.snapshot().await.committed();
    assert_eq!(spent, TAKE_COST * 2);

    let second = fixture.orchestrator().run(chain(&texts), 2).await.unwrap();
    assert!(second.is_complete());
    for index in 0..2 {
        let entry = entry(&second, index);
        assert!(*entry.cache_hit());
        assert_eq!(*entry.credits_charged(), 0);
        assert_eq!(entry.asset(), self::entry(&first, index).asset());
    }
    assert_eq!(fixture.provider.submit_count().await, 2);
    assert_eq!(*fixture.ledger.snapshot().await.committed(), spent);
}

#[tokio::test]
async fn test_cache_entry_with_missing_asset_is_regenerated() {
    let fixture = Fixture::new(SimulatedProvider::new("sim"), 100);
    let texts = ["Door opens.", "Hero steps through."];
    let first = fixture.orchestrator().run(chain(&texts), 2).await.unwrap();
    assert!(first.is_complete());

    // Same cache, but the clips it points at are gone.
    let store: Arc<dyn AssetStore> = Arc::new(MemoryAssetStore::new());
    let orchestrator = GenerationOrchestrator::new(
        fixture.strategy(),
        fixture.ledger.clone(),
        fixture.cache.clone(),
        store.clone(),
        Arc::new(DigestFrameExtractor::new(store.clone())),
    )
    .with_backoff(fast_backoff());

    let second = orchestrator.run(chain(&texts), 2).await.unwrap();
    assert!(second.is_complete());
    for index in 0..2 {
        let entry = entry(&second, index);
        assert!(!*entry.cache_hit());
        assert!(!entry.transitions().contains(&TakeStatus::CacheHit));
        let asset = entry.asset().clone().expect("Committed take has an asset");
        assert!(store.exists(&asset).await.unwrap());
    }
    assert_eq!(fixture.provider.submit_count().await, 4);

    // The regenerated clips replaced the stale entries.
    let third = orchestrator.run(chain(&texts), 2).await.unwrap();
    assert!(third.entries().iter().all(|entry| *entry.cache_hit()));
    assert_eq!(fixture.provider.submit_count().await, 4);
}

#[tokio::test]
async fn test_cancel_releases_reservations() {
    let fixture = Fixture::new(
        SimulatedProvider::new("sim")
            .with_outcomes("", vec![ScriptedOutcome::NeverFinishes; 3]),
        100,
    );
    let orchestrator = fixture.orchestrator();
    let takes = vec![take(0, "One."), take(1, "Two."), take(2, "Three.")];

    let (timeline, _) = tokio::join!(orchestrator.run(takes, 3), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.cancel();
    });
    let timeline = timeline.unwrap();

    for index in 0..3 {
        assert_eq!(failure(&timeline, index), FailureReason::Cancelled);
    }
    let snapshot = fixture.ledger.snapshot().await;
    assert_eq!(*snapshot.reserved(), 0);
    assert_eq!(*snapshot.committed(), 0);
    assert_eq!(fixture.provider.cancelled().await.len(), 3);
}

#[tokio::test]
async fn test_cancel_before_run_stops_next_batch() {
    let fixture = Fixture::new(SimulatedProvider::new("sim"), 100);
    let orchestrator = fixture.orchestrator();
    let takes = || vec![take(0, "One."), take(1, "Two.")];

    orchestrator.cancel();
    assert!(orchestrator.is_cancelled());
    let timeline = orchestrator.run(takes(), 2).await.unwrap();
    for index in 0..2 {
        assert_eq!(failure(&timeline, index), FailureReason::Cancelled);
    }
    assert_eq!(fixture.provider.submit_count().await, 0);
    let snapshot = fixture.ledger.snapshot().await;
    assert_eq!(*snapshot.reserved(), 0);
    assert_eq!(*snapshot.committed(), 0);

    // The request was spent on that batch.
    assert!(!orchestrator.is_cancelled());
    let timeline = orchestrator.run(takes(), 2).await.unwrap();
    assert_eq!(timeline.committed_count(), 2);
    assert_eq!(fixture.provider.submit_count().await, 2);
}

#[tokio::test]
async fn test_not_found_within_grace_recovers() {
    let fixture = Fixture::new(
        SimulatedProvider::new("sim")
            .with_outcomes("lagging", vec![ScriptedOutcome::NotFoundFor(3)]),
        100,
    );

    let timeline = fixture
        .orchestrator()
        .run(vec![take(0, "A lagging upload.")], 1)
        .await
        .unwrap();

    assert!(entry(&timeline, 0).is_committed());
    assert_eq!(*entry(&timeline, 0).attempts(), 1);
    assert!(fixture.provider.poll_count().await >= 4);
}

#[tokio::test]
async fn test_not_found_past_grace_fails() {
    let fixture = Fixture::new(
        SimulatedProvider::new("sim")
            .with_outcomes("lost", vec![ScriptedOutcome::NotFoundFor(u32::MAX)]),
        100,
    );
    let orchestrator = fixture.orchestrator_with(fixture.strategy()).with_backoff(
        fast_backoff().with_not_found_grace_ms(20),
    );

    let timeline = orchestrator
        .run(vec![take(0, "A lost task.")], 1)
        .await
        .unwrap();

    assert!(matches!(
        failure(&timeline, 0),
        FailureReason::TaskNotFound(_)
    ));
    assert_eq!(fixture.provider.submit_count().await, 1);
    assert_eq!(fixture.ledger.available().await, 100);
}

#[tokio::test]
async fn test_fallback_after_consecutive_failures() {
    let fixture = Fixture::new(
        SimulatedProvider::new("primary").with_outcomes(
            "",
            vec![ScriptedOutcome::SubmitTransient("overloaded".to_string()); 5],
        ),
        100,
    );
    let backup = Arc::new(SimulatedProvider::new("backup"));
    let orchestrator = fixture
        .orchestrator_with(fixture.strategy().with_fallback(backup.clone()))
        .with_backoff(fast_backoff().with_max_attempts(3).with_fallback_after(2));

    let timeline = orchestrator
        .run(vec![take(0, "A lighthouse.")], 1)
        .await
        .unwrap();

    let entry = entry(&timeline, 0);
    assert!(entry.is_committed());
    assert_eq!(entry.provider().as_deref(), Some("backup"));
    assert!(entry.transitions().contains(&TakeStatus::FallbackProvider));
    assert_eq!(fixture.provider.submit_count().await, 2);
    assert_eq!(backup.submit_count().await, 1);
}

#[tokio::test]
async fn test_take_timeout_cancels_task() {
    let fixture = Fixture::new(
        SimulatedProvider::new("sim")
            .with_outcomes("stuck", vec![ScriptedOutcome::NeverFinishes]),
        100,
    );
    let orchestrator = fixture
        .orchestrator()
        .with_backoff(fast_backoff().with_take_timeout_ms(40));

    let timeline = orchestrator
        .run(vec![take(0, "A stuck render.")], 1)
        .await
        .unwrap();

    assert!(matches!(failure(&timeline, 0), FailureReason::TimedOut(_)));
    assert_eq!(fixture.provider.cancelled().await.len(), 1);
    assert_eq!(fixture.ledger.available().await, 100);
}

#[tokio::test]
async fn test_branching_graph_rejected_before_work() {
    let fixture = Fixture::new(SimulatedProvider::new("sim"), 100);
    let root = take(0, "Root.");
    let left = take(1, "Left.").with_dependency(*root.id());
    let right = take(2, "Right.").with_dependency(*root.id());

    let err = fixture
        .orchestrator()
        .run(vec![root, left, right], 2)
        .await
        .unwrap_err();

    match err.kind() {
        LumiereErrorKind::Validation(e) => {
            assert!(matches!(e.kind, ValidationErrorKind::InvalidTakeGraph(_)))
        }
        other => panic!("expected validation error, got {other}"),
    }
    assert_eq!(fixture.provider.submit_count().await, 0);
    assert_eq!(fixture.ledger.available().await, 100);
}

#[tokio::test]
async fn test_zero_concurrency_rejected() {
    let fixture = Fixture::new(SimulatedProvider::new("sim"), 100);
    let err = fixture
        .orchestrator()
        .run(vec![take(0, "Anything.")], 0)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), LumiereErrorKind::Validation(_)));
}

#[tokio::test]
async fn test_events_follow_transitions() {
    let fixture = Fixture::new(SimulatedProvider::new("sim"), 100);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let orchestrator = fixture.orchestrator().with_events(tx);

    let timeline = orchestrator
        .run(vec![take(0, "A red kite.")], 1)
        .await
        .unwrap();

    let mut statuses = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.index, 0);
        statuses.push(event.status);
    }
    assert_eq!(
        statuses,
        vec![
            TakeStatus::CacheCheck,
            TakeStatus::CacheMiss,
            TakeStatus::Reserving,
            TakeStatus::Submitting,
            TakeStatus::Polling,
            TakeStatus::Succeeded,
            TakeStatus::Committed,
        ]
    );
    assert_eq!(&entry(&timeline, 0).transitions()[1..], statuses.as_slice());
}

/// Provider wrapper that tracks how many tasks are between submit and download.
struct GaugeProvider {
    inner: SimulatedProvider,
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ExternalProvider for GaugeProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<ProviderTaskId> {
        let task_id = self.inner.submit(request).await?;
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(task_id)
    }

    async fn poll(&self, task_id: &ProviderTaskId) -> ProviderResult<PollStatus> {
        self.inner.poll(task_id).await
    }

    async fn download(&self, asset_url: &str) -> ProviderResult<Vec<u8>> {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.inner.download(asset_url).await
    }
}

#[tokio::test]
async fn test_concurrency_budget_bounds_in_flight_takes() {
    let fixture = Fixture::new(SimulatedProvider::new("unused"), 100);
    let gauge = Arc::new(GaugeProvider {
        inner: SimulatedProvider::new("gauge").with_processing_polls(3),
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let orchestrator = fixture.orchestrator_with(ProviderStrategy::new(gauge.clone()));
    let takes = (0..6)
        .map(|index| take(index, &format!("Shot number {}.", index)))
        .collect();

    let timeline = orchestrator.run(takes, 2).await.unwrap();

    assert!(timeline.is_complete());
    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak in flight was {peak}");
}
