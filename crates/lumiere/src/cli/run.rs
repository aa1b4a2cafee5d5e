//! Segment, plan and run command handlers.

use super::OutputFormat;
use lumiere::{LumiereConfig, Pipeline, PipelineOptions, SegmentationOutput, Take, TimelineEntry};
use std::error::Error;
use std::path::Path;
use tracing::info;

type CommandResult = Result<(), Box<dyn Error>>;

async fn read_script(path: &Path) -> Result<String, Box<dyn Error>> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read script {}: {}", path.display(), e).into())
}

fn print_segments(output: &SegmentationOutput) {
    let metadata = output.metadata();
    println!(
        "{} segments, {} tokens, ~{:.1}s ({:?})",
        output.segments().len(),
        metadata.total_tokens(),
        metadata.estimated_duration_secs(),
        metadata.effective_mode()
    );
    for segment in output.segments() {
        let truncated = if segment.truncation().is_some() { " [truncated]" } else { "" };
        println!(
            "  [{:>3}] {:>6}..{:<6} {:>4} tok  ~{:>5.1}s{}  {}",
            segment.index(),
            segment.start(),
            segment.end(),
            segment.estimated_tokens(),
            segment.estimated_duration_secs(),
            truncated,
            segment.text()
        );
    }
    for warning in output.warnings() {
        println!("  warning: {}", warning);
    }
}

fn print_takes(takes: &[Take]) {
    for take in takes {
        let seed = match take.depends_on() {
            Some(_) => format!("seeded by take {}", take.index().saturating_sub(1)),
            None => "independent".to_string(),
        };
        println!(
            "  take {:>3}  {:>5.1}s  {}  {}",
            take.index(),
            take.target_duration().target_secs(),
            seed,
            take.text()
        );
    }
}

fn print_entry(entry: &TimelineEntry) {
    let detail = match (entry.failure(), entry.asset()) {
        (Some(reason), _) => reason.to_string(),
        (None, Some(asset)) if *entry.cache_hit() => format!("cached {}", asset.location),
        (None, Some(asset)) => format!("{}", asset.location),
        (None, None) => String::new(),
    };
    println!(
        "  take {:>3}  {:<9}  attempts {}  credits {:>4}  {}",
        entry.take().index(),
        entry.final_status().to_string(),
        entry.attempts(),
        entry.credits_charged(),
        detail
    );
}

/// Print the segments of a script.
pub async fn segment_script(
    config: &LumiereConfig,
    script: &Path,
    format: OutputFormat,
) -> CommandResult {
    let text = read_script(script).await?;
    let pipeline = Pipeline::from_config(config, &PipelineOptions::default().with_simulate(true))?;
    let output = pipeline.segment(&text).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Human => print_segments(&output),
    }
    Ok(())
}

/// Print the takes planned for a script.
pub async fn plan_script(config: &LumiereConfig, script: &Path, format: OutputFormat) -> CommandResult {
    let text = read_script(script).await?;
    let pipeline = Pipeline::from_config(config, &PipelineOptions::default().with_simulate(true))?;
    let (output, takes) = pipeline.plan(&text).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&takes)?),
        OutputFormat::Human => {
            print_segments(&output);
            println!("continuity: {}", config.continuity().mode());
            print_takes(&takes);
        }
    }
    Ok(())
}

/// Generate every take of a script and print the timeline.
///
/// Ctrl-C cancels the batch; reservations for unfinished takes are released
/// before the timeline is printed.
pub async fn run_script(
    config: &LumiereConfig,
    script: &Path,
    options: PipelineOptions,
    format: OutputFormat,
) -> CommandResult {
    let text = read_script(script).await?;
    let pipeline = Pipeline::from_config(config, &options)?;

    let run = pipeline.run(&text);
    tokio::pin!(run);
    let report = tokio::select! {
        report = &mut run => report?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling batch");
            pipeline.orchestrator().cancel();
            run.await?
        }
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Human => {
            println!(
                "{} committed, {} failed",
                report.timeline().committed_count(),
                report.timeline().failed_count()
            );
            for entry in report.timeline().entries() {
                print_entry(entry);
            }
            let ledger = report.ledger();
            println!(
                "credits: {} committed, {} reserved, {} available",
                ledger.committed(),
                ledger.reserved(),
                ledger.available()
            );
        }
    }
    Ok(())
}
