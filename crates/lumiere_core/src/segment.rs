//! Script segments, segmentation constraints and results.

use crate::DurationRange;
use lumiere_error::{ScriptError, ScriptErrorKind};
use serde::{Deserialize, Serialize};

/// Limits applied while segmenting a script.
///
/// # Examples
///
/// ```
/// use lumiere_core::SegmentConstraints;
///
/// let constraints = SegmentConstraints::default().with_max_segments(3);
/// assert!(constraints.validate().is_ok());
///
/// let broken = SegmentConstraints::default()
///     .with_min_duration_secs(12.0)
///     .with_max_duration_secs(4.0);
/// assert!(broken.validate().is_err());
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    derive_getters::Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
#[builder(default)]
#[serde(deny_unknown_fields)]
pub struct SegmentConstraints {
    /// Shortest clip a provider accepts (seconds)
    #[serde(default = "default_min_duration")]
    min_duration_secs: f64,

    /// Longest clip a provider accepts (seconds)
    #[serde(default = "default_max_duration")]
    max_duration_secs: f64,

    /// Upper bound on estimated prompt tokens per segment
    #[serde(default = "default_max_tokens")]
    max_tokens_per_segment: usize,

    /// Upper bound on the number of segments
    #[serde(default = "default_max_segments")]
    max_segments: usize,

    /// Whether violations may be fixed by merging or truncating
    #[serde(default = "default_true")]
    allow_auto_adjustment: bool,

    /// Whether unfixable violations abort segmentation
    #[serde(default)]
    enforce_strict_limits: bool,

    /// Speech rate used to estimate clip duration
    #[serde(default = "default_words_per_second")]
    words_per_second: f64,

    /// Appended to truncated segment text
    #[serde(default = "default_truncation_marker")]
    truncation_marker: String,

    /// Proposed boundaries below this confidence are ignored
    #[serde(default = "default_min_confidence")]
    min_confidence: f32,
}

fn default_min_duration() -> f64 {
    2.0
}

fn default_max_duration() -> f64 {
    10.0
}

fn default_max_tokens() -> usize {
    120
}

fn default_max_segments() -> usize {
    24
}

fn default_true() -> bool {
    true
}

fn default_words_per_second() -> f64 {
    2.5
}

fn default_truncation_marker() -> String {
    " […]".to_string()
}

fn default_min_confidence() -> f32 {
    0.5
}

impl Default for SegmentConstraints {
    fn default() -> Self {
        Self {
            min_duration_secs: default_min_duration(),
            max_duration_secs: default_max_duration(),
            max_tokens_per_segment: default_max_tokens(),
            max_segments: default_max_segments(),
            allow_auto_adjustment: default_true(),
            enforce_strict_limits: false,
            words_per_second: default_words_per_second(),
            truncation_marker: default_truncation_marker(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl SegmentConstraints {
    /// Creates a new constraints builder.
    pub fn builder() -> SegmentConstraintsBuilder {
        SegmentConstraintsBuilder::default()
    }

    /// Reject contradictory or unusable limits.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConstraints` describing the first problem found.
    pub fn validate(&self) -> Result<(), ScriptError> {
        let invalid = |msg: String| Err(ScriptError::new(ScriptErrorKind::InvalidConstraints(msg)));

        if !self.min_duration_secs.is_finite() || self.min_duration_secs < 0.0 {
            return invalid(format!(
                "min duration must be a non-negative number, got {}",
                self.min_duration_secs
            ));
        }
        if !self.max_duration_secs.is_finite() || self.max_duration_secs <= 0.0 {
            return invalid(format!(
                "max duration must be positive, got {}",
                self.max_duration_secs
            ));
        }
        if self.min_duration_secs > self.max_duration_secs {
            return invalid(format!(
                "min duration {} exceeds max duration {}",
                self.min_duration_secs, self.max_duration_secs
            ));
        }
        if self.max_tokens_per_segment == 0 {
            return invalid("max tokens per segment must be at least 1".to_string());
        }
        // Token estimate is a quarter token per char, so the marker must leave
        // room for at least one char of text.
        let marker_chars = self.truncation_marker.chars().count();
        if marker_chars > 0 && marker_chars >= self.max_tokens_per_segment.saturating_mul(4) {
            return invalid(format!(
                "truncation marker {:?} does not fit within {} tokens per segment",
                self.truncation_marker, self.max_tokens_per_segment
            ));
        }
        if self.max_segments == 0 {
            return invalid("max segments must be at least 1".to_string());
        }
        if !self.words_per_second.is_finite() || self.words_per_second <= 0.0 {
            return invalid(format!(
                "words per second must be positive, got {}",
                self.words_per_second
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return invalid(format!(
                "min confidence must be within [0, 1], got {}",
                self.min_confidence
            ));
        }
        Ok(())
    }

    /// Whether a violation must abort instead of being adjusted.
    pub fn fails_on_violation(&self) -> bool {
        self.enforce_strict_limits && !self.allow_auto_adjustment
    }

    /// Duration range for a segment whose spoken estimate is `estimate_secs`.
    pub fn duration_range_for(&self, estimate_secs: f64) -> DurationRange {
        let target = estimate_secs.clamp(self.min_duration_secs, self.max_duration_secs);
        DurationRange::new(self.min_duration_secs, target)
    }
}

/// How deterministic segmentation chooses cut points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Cut after sentences, splitting sentences that exceed the max duration
    #[default]
    Sentence,
    /// Cut into equal token shares at word boundaries
    EvenTokens,
}

/// Segmentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Rule-based segmentation
    Deterministic {
        /// Cut strategy
        strategy: SplitStrategy,
    },
    /// Boundary proposer suggests cuts
    Assisted,
}

impl Default for SegmentationMode {
    fn default() -> Self {
        SegmentationMode::Deterministic {
            strategy: SplitStrategy::default(),
        }
    }
}

impl std::str::FromStr for SegmentationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deterministic" | "sentence" => Ok(SegmentationMode::Deterministic {
                strategy: SplitStrategy::Sentence,
            }),
            "even" | "even_tokens" | "even-tokens" => Ok(SegmentationMode::Deterministic {
                strategy: SplitStrategy::EvenTokens,
            }),
            "assisted" => Ok(SegmentationMode::Assisted),
            _ => Err(format!("Unknown segmentation mode: {}", s)),
        }
    }
}

/// Boundary suggested by a proposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_new::new)]
pub struct ProposedBoundary {
    /// Text of the proposed segment, verbatim from the script
    pub text: String,
    /// Confidence in `[0, 1]`
    pub confidence: f32,
    /// Free-form classification hints (e.g. "dialogue", "establishing")
    pub taxonomy_hints: Vec<String>,
}

/// Record of a truncation applied to a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationProvenance {
    /// Estimated tokens before truncation
    pub original_tokens: usize,
    /// Estimated tokens kept (marker excluded)
    pub retained_tokens: usize,
    /// Characters in the original text
    pub original_chars: usize,
    /// Characters kept (marker excluded)
    pub retained_chars: usize,
}

/// Contiguous slice of the normalized script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Segment {
    /// Position in output order
    index: usize,
    /// Byte offset where the span starts
    start: usize,
    /// Byte offset where the span ends (exclusive)
    end: usize,
    /// Prompt text (trimmed span, possibly truncated)
    text: String,
    /// Estimated prompt tokens of `text`
    estimated_tokens: usize,
    /// Estimated spoken duration of the span
    estimated_duration_secs: f64,
    /// Requested clip duration
    target_duration: DurationRange,
    /// Present when `text` was shortened
    truncation: Option<TruncationProvenance>,
    /// Proposer confidence for this boundary
    confidence: Option<f32>,
    /// Proposer taxonomy hints
    taxonomy_hints: Vec<String>,
}

impl Segment {
    /// Assemble a segment. Used by segmenters.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        start: usize,
        end: usize,
        text: String,
        estimated_tokens: usize,
        estimated_duration_secs: f64,
        target_duration: DurationRange,
        truncation: Option<TruncationProvenance>,
        confidence: Option<f32>,
        taxonomy_hints: Vec<String>,
    ) -> Self {
        Self {
            index,
            start,
            end,
            text,
            estimated_tokens,
            estimated_duration_secs,
            target_duration,
            truncation,
            confidence,
            taxonomy_hints,
        }
    }

    /// Slice of `normalized` covered by this segment.
    pub fn span<'a>(&self, normalized: &'a str) -> Option<&'a str> {
        normalized.get(self.start..self.end)
    }

    /// Length of the span in bytes.
    pub fn span_len(&self) -> usize {
        self.end - self.start
    }

    /// Whether `text` was truncated.
    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }
}

/// Non-fatal notes produced during segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::Display)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum SegmentationWarning {
    /// Assisted mode fell back to deterministic segmentation
    #[display("fallback used: {}", reason)]
    FallbackUsed {
        /// Why the proposer was not used
        reason: String,
    },
    /// Segment text was truncated to fit the token limit
    #[display("segment {} truncated from {} to {} tokens", index, original_tokens, retained_tokens)]
    Truncated {
        /// Segment index
        index: usize,
        /// Tokens before truncation
        original_tokens: usize,
        /// Tokens after truncation
        retained_tokens: usize,
    },
    /// Adjacent segments were merged to fit the segment limit
    #[display("{} merges applied to fit {} segments", merges, max_segments)]
    Merged {
        /// Number of merges
        merges: usize,
        /// Limit that forced the merges
        max_segments: usize,
    },
    /// Proposed boundaries ignored for low confidence
    #[display("{} low-confidence boundaries ignored", count)]
    LowConfidenceDropped {
        /// Number of boundaries dropped
        count: usize,
    },
}

/// Facts about a segmentation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct SegmentationMetadata {
    /// Mode the caller asked for
    requested_mode: SegmentationMode,
    /// Mode that produced the segments
    effective_mode: SegmentationMode,
    /// Byte length of the normalized script
    normalized_len: usize,
    /// Estimated tokens of the whole script
    total_tokens: usize,
    /// Estimated spoken duration of the whole script
    estimated_duration_secs: f64,
    /// Boundaries accepted from the proposer
    proposer_boundaries: usize,
}

impl SegmentationMetadata {
    /// Assemble metadata. Used by segmenters.
    pub fn new(
        requested_mode: SegmentationMode,
        effective_mode: SegmentationMode,
        normalized_len: usize,
        total_tokens: usize,
        estimated_duration_secs: f64,
        proposer_boundaries: usize,
    ) -> Self {
        Self {
            requested_mode,
            effective_mode,
            normalized_len,
            total_tokens,
            estimated_duration_secs,
            proposer_boundaries,
        }
    }
}

/// Result of segmenting a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct SegmentationOutput {
    /// Normalized script the offsets refer to
    normalized: String,
    /// Ordered, contiguous segments
    segments: Vec<Segment>,
    /// Run facts
    metadata: SegmentationMetadata,
    /// Non-fatal notes
    warnings: Vec<SegmentationWarning>,
}

impl SegmentationOutput {
    /// Assemble an output. Used by segmenters.
    pub fn new(
        normalized: String,
        segments: Vec<Segment>,
        metadata: SegmentationMetadata,
        warnings: Vec<SegmentationWarning>,
    ) -> Self {
        Self {
            normalized,
            segments,
            metadata,
            warnings,
        }
    }

    /// Concatenate every span; equals `normalized` for valid output.
    pub fn reconstruct(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| s.span(&self.normalized))
            .collect()
    }

    /// Whether assisted mode fell back.
    pub fn fallback_used(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, SegmentationWarning::FallbackUsed { .. }))
    }

    /// Take ownership of the segments.
    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }
}
