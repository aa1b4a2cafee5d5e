//! End-to-end pipeline tests against the simulated provider.

use lumiere::{
    BackoffPolicy, ContinuityMode, FailureReason, FinalStatus, LumiereConfig,
    LumiereResult, Pipeline, PipelineOptions, TakeStatus,
};

const SCRIPT: &str = "\
The lighthouse keeper climbs the spiral stairs as the storm gathers over the grey water below. \
Rain lashes against the lantern glass while the great lamp turns slowly above her head.

A small fishing boat fights the swell far out beyond the rocks, its single light flickering. \
She raises the signal lamp and sweeps its beam across the heaving black waves toward the boat.

By dawn the sea has calmed and the boat rests safely against the harbour wall in soft light. \
The keeper watches from the gallery, coffee steaming in her hands, as gulls circle overhead.";

fn test_config() -> LumiereResult<LumiereConfig> {
    let backoff = BackoffPolicy::default()
        .with_poll_initial_ms(1)
        .with_poll_max_ms(4)
        .with_retry_delay_ms(1)
        .with_take_timeout_ms(5_000)
        .with_call_timeout_ms(1_000);
    Ok(LumiereConfig::bundled()?.with_backoff(backoff))
}

fn simulated(balance: u64) -> PipelineOptions {
    PipelineOptions::default()
        .with_simulate(true)
        .with_balance(Some(balance))
}

#[tokio::test]
async fn test_segment_produces_ordered_segments() -> LumiereResult<()> {
    let config = test_config()?;
    let pipeline = Pipeline::from_config(&config, &simulated(0))?;

    let output = pipeline.segment(SCRIPT).await?;

    assert!(output.segments().len() >= 2);
    for (position, segment) in output.segments().iter().enumerate() {
        assert_eq!(*segment.index(), position);
        assert!(*segment.estimated_tokens() <= *config.segmenter().max_tokens_per_segment());
    }
    for pair in output.segments().windows(2) {
        assert!(pair[0].end() <= pair[1].start());
    }
    Ok(())
}

#[tokio::test]
async fn test_plan_chains_adjacent_takes() -> LumiereResult<()> {
    let config = test_config()?;
    let pipeline = Pipeline::from_config(&config, &simulated(0))?;

    let (output, takes) = pipeline.plan(SCRIPT).await?;

    assert_eq!(takes.len(), output.segments().len());
    assert!(takes[0].depends_on().is_none());
    for pair in takes.windows(2) {
        assert_eq!(*pair[1].depends_on(), Some(*pair[0].id()));
    }
    Ok(())
}

#[tokio::test]
async fn test_plan_without_continuity_is_independent() -> LumiereResult<()> {
    let file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("Failed to create temp file");
    std::fs::write(file.path(), "[continuity]\nmode = \"none\"\n").expect("Failed to write temp file");
    let config = LumiereConfig::from_file(file.path())?;
    assert_eq!(*config.continuity().mode(), ContinuityMode::None);
    let pipeline = Pipeline::from_config(&config, &simulated(0))?;

    let (_, takes) = pipeline.plan(SCRIPT).await?;

    assert!(takes.len() >= 2);
    assert!(takes.iter().all(|take| take.depends_on().is_none()));
    Ok(())
}

#[tokio::test]
async fn test_simulated_run_commits_every_take() -> LumiereResult<()> {
    let config = test_config()?;
    let pipeline = Pipeline::from_config(&config, &simulated(1_000))?;

    let report = pipeline.run(SCRIPT).await?;
    let timeline = report.timeline();

    assert_eq!(timeline.len(), report.segmentation().segments().len());
    assert!(timeline.is_complete());
    assert_eq!(timeline.failed_count(), 0);
    assert_eq!(report.ledger().committed(), &timeline.total_credits());
    assert_eq!(*report.ledger().reserved(), 0);

    for (position, entry) in timeline.entries().iter().enumerate() {
        assert_eq!(*entry.take().index(), position);
        assert_eq!(*entry.final_status(), FinalStatus::Committed);
        assert!(entry.asset().is_some());
        assert_eq!(entry.provider().as_deref(), Some("primary"));
    }
    Ok(())
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() -> LumiereResult<()> {
    let config = test_config()?;
    let pipeline = Pipeline::from_config(&config, &simulated(1_000))?;

    let first = pipeline.run(SCRIPT).await?;
    let second = pipeline.run(SCRIPT).await?;

    assert!(second.timeline().is_complete());
    assert!(second.timeline().entries().iter().all(|e| *e.cache_hit()));
    assert_eq!(second.timeline().total_credits(), 0);
    assert_eq!(second.ledger().committed(), first.ledger().committed());
    Ok(())
}

#[tokio::test]
async fn test_empty_balance_fails_first_take_and_skips_chain() -> LumiereResult<()> {
    let config = test_config()?;
    let pipeline = Pipeline::from_config(&config, &simulated(0))?;

    let report = pipeline.run(SCRIPT).await?;
    let entries = report.timeline().entries();

    assert_eq!(report.timeline().committed_count(), 0);
    assert!(matches!(
        entries[0].failure(),
        Some(FailureReason::InsufficientBudget(_))
    ));
    for entry in &entries[1..] {
        assert_eq!(entry.failure().as_ref(), Some(&FailureReason::DependencyFailed));
        assert_eq!(*entry.attempts(), 0);
    }
    assert_eq!(*report.ledger().committed(), 0);
    Ok(())
}

#[tokio::test]
async fn test_run_rejects_empty_script() -> LumiereResult<()> {
    let config = test_config()?;
    let pipeline = Pipeline::from_config(&config, &simulated(10))?;

    assert!(pipeline.run("   \n\t  ").await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_events_report_every_take() -> LumiereResult<()> {
    let config = test_config()?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let pipeline = Pipeline::from_config(&config, &simulated(1_000))?.with_events(tx);

    let report = pipeline.run(SCRIPT).await?;
    drop(pipeline);

    let mut committed = 0;
    while let Some(event) = rx.recv().await {
        if event.status == TakeStatus::Committed {
            committed += 1;
        }
    }
    assert_eq!(committed, report.timeline().committed_count());
    Ok(())
}
