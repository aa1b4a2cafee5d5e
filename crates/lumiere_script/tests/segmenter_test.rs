//! Tests for script segmentation.

use async_trait::async_trait;
use lumiere_core::{
    ProposedBoundary, SegmentConstraints, SegmentationMode, SegmentationOutput,
    SegmentationWarning, SplitStrategy,
};
use lumiere_error::{ConfigError, ConfigErrorKind, LumiereErrorKind, LumiereResult, ScriptErrorKind};
use lumiere_interface::BoundaryProposer;
use lumiere_script::ScriptSegmenter;

fn script_kind(err: &lumiere_error::LumiereError) -> ScriptErrorKind {
    match err.kind() {
        LumiereErrorKind::Script(e) => e.kind.clone(),
        other => panic!("expected script error, got {other}"),
    }
}

fn assert_tiles(output: &SegmentationOutput) {
    let segments = output.segments();
    assert!(!segments.is_empty());
    assert_eq!(*segments[0].start(), 0);
    assert_eq!(
        *segments[segments.len() - 1].end(),
        output.normalized().len()
    );
    for pair in segments.windows(2) {
        assert_eq!(pair[0].end(), pair[1].start(), "segments must be contiguous");
    }
    assert_eq!(&output.reconstruct(), output.normalized());
    for segment in segments {
        assert!(!segment.text().trim().is_empty(), "no empty segments");
    }
}

/// Proposer returning a fixed list.
struct FixedProposer {
    boundaries: Vec<ProposedBoundary>,
}

#[async_trait]
impl BoundaryProposer for FixedProposer {
    async fn classify(
        &self,
        _text: &str,
        _constraints: &SegmentConstraints,
    ) -> LumiereResult<Vec<ProposedBoundary>> {
        Ok(self.boundaries.clone())
    }
}

/// Proposer that always errors.
struct BrokenProposer;

#[async_trait]
impl BoundaryProposer for BrokenProposer {
    async fn classify(
        &self,
        _text: &str,
        _constraints: &SegmentConstraints,
    ) -> LumiereResult<Vec<ProposedBoundary>> {
        Err(ConfigError::new(ConfigErrorKind::Unavailable(
            "model endpoint unreachable".to_string(),
        )))?
    }
}

/// Proposer without credentials.
struct UnconfiguredProposer;

#[async_trait]
impl BoundaryProposer for UnconfiguredProposer {
    fn is_configured(&self) -> bool {
        false
    }

    async fn classify(
        &self,
        _text: &str,
        _constraints: &SegmentConstraints,
    ) -> LumiereResult<Vec<ProposedBoundary>> {
        panic!("unconfigured proposer must not be called");
    }
}

#[tokio::test]
async fn test_three_sentences_three_segments() {
    let segmenter = ScriptSegmenter::new(SegmentConstraints::default().with_max_segments(3));
    let output = segmenter
        .segment("A. B. C.", SegmentationMode::default(), None)
        .await
        .unwrap();

    assert_eq!(output.segments().len(), 3);
    assert_tiles(&output);
    let texts: Vec<_> = output.segments().iter().map(|s| s.text().as_str()).collect();
    assert_eq!(texts, vec!["A.", "B.", "C."]);
}

#[tokio::test]
async fn test_empty_script_rejected() {
    let segmenter = ScriptSegmenter::default();
    for script in ["", "   ", "\n\t\r\n"] {
        let err = segmenter
            .segment(script, SegmentationMode::default(), None)
            .await
            .unwrap_err();
        assert_eq!(script_kind(&err), ScriptErrorKind::EmptyScript);
    }
}

#[tokio::test]
async fn test_contradictory_constraints_rejected() {
    let constraints = SegmentConstraints::default()
        .with_min_duration_secs(8.0)
        .with_max_duration_secs(4.0);
    let err = ScriptSegmenter::new(constraints)
        .segment("Some text.", SegmentationMode::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(script_kind(&err), ScriptErrorKind::InvalidConstraints(_)));
}

#[tokio::test]
async fn test_single_word_single_segment() {
    let output = ScriptSegmenter::default()
        .segment("  Hello  ", SegmentationMode::default(), None)
        .await
        .unwrap();
    assert_eq!(output.segments().len(), 1);
    assert_eq!(output.segments()[0].text(), "Hello");
    assert_tiles(&output);
}

#[tokio::test]
async fn test_unicode_preserved() {
    let script = "Le café est fermé. 🎬 La caméra tourne! 夜の港。";
    let output = ScriptSegmenter::default()
        .segment(script, SegmentationMode::default(), None)
        .await
        .unwrap();
    assert_tiles(&output);
    assert_eq!(output.normalized(), script);
    assert_eq!(output.segments()[1].text(), "🎬 La caméra tourne!");
}

#[tokio::test]
async fn test_excess_whitespace_no_empty_segments() {
    let script = "First.    \n\n\n\n   Second.  \t  Third.\r\n\r\n\r\n";
    let output = ScriptSegmenter::default()
        .segment(script, SegmentationMode::default(), None)
        .await
        .unwrap();
    assert_tiles(&output);
    assert_eq!(output.normalized(), "First.\n\nSecond. Third.");
    assert_eq!(output.segments().len(), 3);
}

#[tokio::test]
async fn test_paragraph_break_splits_without_terminator() {
    let output = ScriptSegmenter::default()
        .segment("Harbor at dawn\n\nGulls lift off", SegmentationMode::default(), None)
        .await
        .unwrap();
    assert_eq!(output.segments().len(), 2);
    assert_tiles(&output);
}

#[tokio::test]
async fn test_segment_count_merged_smallest_first() {
    let segmenter = ScriptSegmenter::new(SegmentConstraints::default().with_max_segments(2));
    let output = segmenter
        .segment(
            "A long opening sentence here. B. Another long closing sentence.",
            SegmentationMode::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(output.segments().len(), 2);
    assert_tiles(&output);
    // "B." is the smallest and merges into its shorter neighbour.
    assert_eq!(output.segments()[0].text(), "A long opening sentence here. B.");
    assert!(output.warnings().contains(&SegmentationWarning::Merged {
        merges: 1,
        max_segments: 2
    }));
}

#[tokio::test]
async fn test_strict_count_violation_fails() {
    let constraints = SegmentConstraints::default()
        .with_max_segments(2)
        .with_allow_auto_adjustment(false)
        .with_enforce_strict_limits(true);
    let err = ScriptSegmenter::new(constraints)
        .segment("A. B. C.", SegmentationMode::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        script_kind(&err),
        ScriptErrorKind::ConstraintViolationUnresolvable(_)
    ));
}

#[tokio::test]
async fn test_token_overflow_truncated_with_provenance() {
    let constraints = SegmentConstraints::default()
        .with_max_tokens_per_segment(5)
        .with_max_duration_secs(60.0);
    let script = "The camera glides over a sleeping city at night.";
    let output = ScriptSegmenter::new(constraints.clone())
        .segment(script, SegmentationMode::default(), None)
        .await
        .unwrap();

    let segment = &output.segments()[0];
    assert!(segment.is_truncated());
    assert!(segment.text().ends_with(constraints.truncation_marker().as_str()));
    assert!(*segment.estimated_tokens() <= 5);
    let provenance = segment.truncation().as_ref().unwrap();
    assert_eq!(provenance.original_chars, script.chars().count());
    assert!(provenance.retained_chars < provenance.original_chars);
    // Span still covers the original sentence.
    assert_eq!(segment.span(output.normalized()), Some(script));
    assert!(matches!(
        output.warnings()[0],
        SegmentationWarning::Truncated { index: 0, .. }
    ));
}

#[tokio::test]
async fn test_marker_wider_than_token_limit_rejected() {
    let constraints = SegmentConstraints::default().with_max_tokens_per_segment(1);
    let err = ScriptSegmenter::new(constraints)
        .segment("The camera glides on.", SegmentationMode::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(script_kind(&err), ScriptErrorKind::InvalidConstraints(_)));

    // A one-char marker leaves room inside a single token.
    let constraints = SegmentConstraints::default()
        .with_max_tokens_per_segment(1)
        .with_max_duration_secs(60.0)
        .with_truncation_marker("~".to_string());
    let output = ScriptSegmenter::new(constraints)
        .segment("The camera glides on.", SegmentationMode::default(), None)
        .await
        .unwrap();
    for segment in output.segments() {
        assert!(*segment.estimated_tokens() <= 1, "{:?}", segment.text());
    }
}

#[tokio::test]
async fn test_strict_token_violation_fails() {
    let constraints = SegmentConstraints::default()
        .with_max_tokens_per_segment(2)
        .with_allow_auto_adjustment(false)
        .with_enforce_strict_limits(true);
    let err = ScriptSegmenter::new(constraints)
        .segment("This sentence is too long.", SegmentationMode::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        script_kind(&err),
        ScriptErrorKind::ConstraintViolationUnresolvable(_)
    ));
}

#[tokio::test]
async fn test_target_duration_clamped() {
    let constraints = SegmentConstraints::default()
        .with_min_duration_secs(2.0)
        .with_max_duration_secs(10.0)
        .with_words_per_second(2.0);
    let output = ScriptSegmenter::new(constraints)
        .segment(
            "Hi. One two three four five six seven eight nine ten.",
            SegmentationMode::default(),
            None,
        )
        .await
        .unwrap();

    let short = output.segments()[0].target_duration();
    assert_eq!(*short.min_secs(), 2.0);
    assert_eq!(short.target_secs(), 2.0);
    let long = output.segments()[1].target_duration();
    assert_eq!(long.target_secs(), 5.0);
}

#[tokio::test]
async fn test_even_token_strategy() {
    let constraints = SegmentConstraints::default().with_max_tokens_per_segment(10);
    let script = "word ".repeat(40);
    let output = ScriptSegmenter::new(constraints)
        .segment(
            &script,
            SegmentationMode::Deterministic {
                strategy: SplitStrategy::EvenTokens,
            },
            None,
        )
        .await
        .unwrap();

    // 199 chars -> 50 tokens -> 5 pieces of 8 words.
    assert_eq!(output.segments().len(), 5);
    assert_tiles(&output);
    for segment in output.segments() {
        assert_eq!(segment.text().split_whitespace().count(), 8);
    }
}

#[tokio::test]
async fn test_assisted_uses_proposed_boundaries() {
    let proposer = FixedProposer {
        boundaries: vec![
            ProposedBoundary::new("INT. KITCHEN - NIGHT".to_string(), 0.9, vec!["scene_heading".to_string()]),
            ProposedBoundary::new("She opens the fridge.".to_string(), 0.2, vec![]),
            ProposedBoundary::new("EXT. STREET".to_string(), 0.8, vec!["scene_heading".to_string()]),
        ],
    };
    let script = "INT. KITCHEN - NIGHT\nShe opens the fridge.\n\nEXT. STREET\nRain falls.";
    let output = ScriptSegmenter::default()
        .segment(script, SegmentationMode::Assisted, Some(&proposer))
        .await
        .unwrap();

    assert!(!output.fallback_used());
    assert_eq!(output.segments().len(), 2);
    assert_tiles(&output);
    assert_eq!(*output.metadata().proposer_boundaries(), 2);
    assert_eq!(*output.metadata().effective_mode(), SegmentationMode::Assisted);
    assert_eq!(output.segments()[0].confidence(), &Some(0.9));
    assert_eq!(output.segments()[1].taxonomy_hints(), &vec!["scene_heading".to_string()]);
    assert!(output
        .warnings()
        .contains(&SegmentationWarning::LowConfidenceDropped { count: 1 }));
}

#[tokio::test]
async fn test_assisted_falls_back_without_proposer() {
    let output = ScriptSegmenter::default()
        .segment("A. B.", SegmentationMode::Assisted, None)
        .await
        .unwrap();
    assert!(output.fallback_used());
    assert_eq!(output.segments().len(), 2);
    assert_eq!(*output.metadata().effective_mode(), SegmentationMode::default());
}

#[tokio::test]
async fn test_assisted_falls_back_on_error_or_misconfiguration() {
    let segmenter = ScriptSegmenter::default();
    let broken = segmenter
        .segment("A. B.", SegmentationMode::Assisted, Some(&BrokenProposer))
        .await
        .unwrap();
    assert!(broken.fallback_used());

    let unconfigured = segmenter
        .segment("A. B.", SegmentationMode::Assisted, Some(&UnconfiguredProposer))
        .await
        .unwrap();
    assert!(unconfigured.fallback_used());
    assert_tiles(&unconfigured);
}

#[tokio::test]
async fn test_assisted_falls_back_on_unknown_text() {
    let proposer = FixedProposer {
        boundaries: vec![ProposedBoundary::new("Not in the script".to_string(), 0.99, vec![])],
    };
    let output = ScriptSegmenter::default()
        .segment("A. B.", SegmentationMode::Assisted, Some(&proposer))
        .await
        .unwrap();
    assert!(output.fallback_used());
    assert_eq!(*output.metadata().proposer_boundaries(), 0);
}
