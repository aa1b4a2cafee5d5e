//! Script segmentation.

use crate::normalize::normalize_script;
use crate::tokens::{count_words, estimate_duration_secs, estimate_tokens};
use lumiere_core::{
    ProposedBoundary, Segment, SegmentConstraints, SegmentationMetadata, SegmentationMode,
    SegmentationOutput, SegmentationWarning, SplitStrategy, TruncationProvenance,
};
use lumiere_error::{LumiereResult, ScriptError, ScriptErrorKind};
use lumiere_interface::BoundaryProposer;
use regex::Regex;
use std::sync::LazyLock;

/// Sentence terminator (plus closing quotes/brackets) and the whitespace after it,
/// or a paragraph break.
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[.!?…]+["'”’)\]]*\s+|\n\n"#).expect("Valid sentence boundary regex")
});

/// A word and the whitespace that follows it.
static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+\s*").expect("Valid word regex"));

/// Byte range of the normalized script plus proposer annotations.
#[derive(Debug, Clone, PartialEq)]
struct Span {
    start: usize,
    end: usize,
    confidence: Option<f32>,
    taxonomy_hints: Vec<String>,
}

impl Span {
    fn plain(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            confidence: None,
            taxonomy_hints: Vec::new(),
        }
    }

    fn chars(&self, normalized: &str) -> usize {
        normalized[self.start..self.end].chars().count()
    }

    /// Absorb the following span.
    fn absorb(&mut self, next: Span) {
        self.end = next.end;
        self.confidence = match (self.confidence, next.confidence) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        for hint in next.taxonomy_hints {
            if !self.taxonomy_hints.contains(&hint) {
                self.taxonomy_hints.push(hint);
            }
        }
    }
}

/// Turns raw scripts into contiguous, bounded segments.
///
/// Segments always tile the normalized script: each segment's end offset is
/// the next one's start, the first starts at zero and the last ends at the
/// normalized length. Truncation only shortens a segment's prompt text; its
/// span is never altered.
#[derive(Debug, Clone, Default)]
pub struct ScriptSegmenter {
    constraints: SegmentConstraints,
}

impl ScriptSegmenter {
    /// Create a segmenter enforcing `constraints`.
    pub fn new(constraints: SegmentConstraints) -> Self {
        Self { constraints }
    }

    /// Constraints in force.
    pub fn constraints(&self) -> &SegmentConstraints {
        &self.constraints
    }

    /// Segment `script`.
    ///
    /// In assisted mode the proposer's boundaries are used when they can be
    /// located in the script; otherwise segmentation falls back to the
    /// sentence strategy and a `FallbackUsed` warning is attached.
    ///
    /// # Errors
    ///
    /// - `InvalidConstraints` if the constraints contradict each other
    /// - `EmptyScript` for empty or whitespace-only input
    /// - `ConstraintViolationUnresolvable` if limits are exceeded while strict
    ///   limits are enforced and auto adjustment is off
    #[tracing::instrument(skip(self, script, proposer), fields(script_len = script.len()))]
    pub async fn segment(
        &self,
        script: &str,
        mode: SegmentationMode,
        proposer: Option<&dyn BoundaryProposer>,
    ) -> LumiereResult<SegmentationOutput> {
        self.constraints.validate()?;

        let normalized = normalize_script(script);
        if normalized.is_empty() {
            return Err(ScriptError::new(ScriptErrorKind::EmptyScript).into());
        }

        let mut warnings = Vec::new();
        let mut proposer_boundaries = 0;

        let (spans, effective_mode) = match mode {
            SegmentationMode::Deterministic { strategy } => {
                (self.deterministic_spans(&normalized, strategy), mode)
            }
            SegmentationMode::Assisted => {
                match self.assisted_spans(&normalized, proposer, &mut warnings).await {
                    Ok((spans, accepted)) => {
                        proposer_boundaries = accepted;
                        (spans, mode)
                    }
                    Err(reason) => {
                        tracing::warn!(reason = %reason, "Boundary proposer unusable, falling back");
                        warnings.push(SegmentationWarning::FallbackUsed { reason });
                        let fallback = SegmentationMode::default();
                        (self.deterministic_spans(&normalized, SplitStrategy::Sentence), fallback)
                    }
                }
            }
        };

        let spans = self.enforce_segment_limit(&normalized, spans, &mut warnings)?;
        let segments = self.build_segments(&normalized, spans, &mut warnings)?;

        let metadata = SegmentationMetadata::new(
            mode,
            effective_mode,
            normalized.len(),
            estimate_tokens(&normalized),
            estimate_duration_secs(&normalized, *self.constraints.words_per_second()),
            proposer_boundaries,
        );

        tracing::debug!(
            segments = segments.len(),
            warnings = warnings.len(),
            "Script segmented"
        );

        Ok(SegmentationOutput::new(normalized, segments, metadata, warnings))
    }

    fn deterministic_spans(&self, normalized: &str, strategy: SplitStrategy) -> Vec<Span> {
        match strategy {
            SplitStrategy::Sentence => self.sentence_spans(normalized),
            SplitStrategy::EvenTokens => self.even_token_spans(normalized),
        }
    }

    /// Cut after sentences, then split sentences too long to speak within the
    /// max duration at word boundaries.
    fn sentence_spans(&self, normalized: &str) -> Vec<Span> {
        let mut sentences = Vec::new();
        let mut cursor = 0;
        for boundary in SENTENCE_END.find_iter(normalized) {
            if boundary.end() > cursor && boundary.end() < normalized.len() {
                sentences.push((cursor, boundary.end()));
                cursor = boundary.end();
            }
        }
        sentences.push((cursor, normalized.len()));

        let words_per_second = *self.constraints.words_per_second();
        let max_words = ((self.constraints.max_duration_secs() * words_per_second).floor()
            as usize)
            .max(1);

        let mut spans = Vec::with_capacity(sentences.len());
        for (start, end) in sentences {
            let words: Vec<_> = WORD.find_iter(&normalized[start..end]).collect();
            if words.len() <= max_words {
                spans.push(Span::plain(start, end));
                continue;
            }
            for chunk in words.chunks(max_words) {
                let first = chunk.first().map(|m| m.start()).unwrap_or_default();
                let last = chunk.last().map(|m| m.end()).unwrap_or_default();
                spans.push(Span::plain(start + first, start + last));
            }
            // Word matches start at the first non-space char and end at the
            // next word, so the chunks already tile the sentence.
            if let Some(last) = spans.last_mut() {
                last.end = end;
            }
        }
        spans
    }

    /// Cut into `ceil(tokens / max_tokens)` pieces of roughly equal length,
    /// at the word boundaries nearest each quantile.
    fn even_token_spans(&self, normalized: &str) -> Vec<Span> {
        let words: Vec<_> = WORD.find_iter(normalized).collect();
        let total_tokens = estimate_tokens(normalized);
        let wanted = total_tokens
            .div_ceil(*self.constraints.max_tokens_per_segment())
            .clamp(1, *self.constraints.max_segments())
            .min(words.len().max(1));

        if wanted <= 1 {
            return vec![Span::plain(0, normalized.len())];
        }

        // Characters preceding each word.
        let mut before = Vec::with_capacity(words.len());
        let mut seen = 0;
        let mut previous_end = 0;
        for word in &words {
            seen += normalized[previous_end..word.start()].chars().count();
            before.push(seen);
            previous_end = word.start();
        }
        let total_chars = normalized.chars().count();

        let mut cuts = Vec::with_capacity(wanted - 1);
        let mut previous = 0;
        for k in 1..wanted {
            let target = total_chars * k / wanted;
            let low = previous + 1;
            let high = words.len() - (wanted - k);
            let best = (low..=high)
                .min_by_key(|&i| before[i].abs_diff(target))
                .unwrap_or(low);
            cuts.push(best);
            previous = best;
        }

        let mut spans = Vec::with_capacity(wanted);
        let mut start = 0;
        for cut in cuts {
            let offset = words[cut].start();
            spans.push(Span::plain(start, offset));
            start = offset;
        }
        spans.push(Span::plain(start, normalized.len()));
        spans
    }

    /// Locate proposer boundaries in the script.
    ///
    /// Returns the spans and the number of accepted boundaries, or the reason
    /// the proposer could not be used.
    async fn assisted_spans(
        &self,
        normalized: &str,
        proposer: Option<&dyn BoundaryProposer>,
        warnings: &mut Vec<SegmentationWarning>,
    ) -> Result<(Vec<Span>, usize), String> {
        let proposer = proposer.ok_or_else(|| "no boundary proposer available".to_string())?;
        if !proposer.is_configured() {
            return Err("boundary proposer is not configured".to_string());
        }

        let proposals = proposer
            .classify(normalized, &self.constraints)
            .await
            .map_err(|e| format!("boundary proposer failed: {}", e))?;
        if proposals.is_empty() {
            return Err("boundary proposer returned no boundaries".to_string());
        }

        let threshold = *self.constraints.min_confidence();
        let (accepted, dropped): (Vec<ProposedBoundary>, Vec<ProposedBoundary>) = proposals
            .into_iter()
            .partition(|p| p.confidence >= threshold);
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), threshold, "Dropping low-confidence boundaries");
            warnings.push(SegmentationWarning::LowConfidenceDropped {
                count: dropped.len(),
            });
        }
        if accepted.is_empty() {
            return Err(format!("no boundaries reached confidence {}", threshold));
        }

        let mut starts: Vec<(usize, ProposedBoundary)> = Vec::with_capacity(accepted.len());
        let mut cursor = 0;
        for proposal in accepted {
            let needle = normalize_script(&proposal.text);
            if needle.is_empty() {
                continue;
            }
            let found = normalized[cursor..]
                .find(&needle)
                .ok_or_else(|| "proposed boundary not found in script order".to_string())?;
            let at = cursor + found;
            cursor = at + needle.len();
            starts.push((at, proposal));
        }
        if starts.is_empty() {
            return Err("boundary proposer returned only empty text".to_string());
        }

        let accepted_count = starts.len();
        let mut spans: Vec<Span> = Vec::with_capacity(accepted_count + 1);
        if starts[0].0 > 0 {
            spans.push(Span::plain(0, starts[0].0));
        }
        // Offsets strictly increase, so consecutive starts tile the script.
        for (i, (at, proposal)) in starts.iter().enumerate() {
            let end = starts
                .get(i + 1)
                .map(|(next, _)| *next)
                .unwrap_or(normalized.len());
            spans.push(Span {
                start: *at,
                end,
                confidence: Some(proposal.confidence),
                taxonomy_hints: proposal.taxonomy_hints.clone(),
            });
        }

        Ok((spans, accepted_count))
    }

    /// Merge adjacent spans, smallest first, until the count fits.
    fn enforce_segment_limit(
        &self,
        normalized: &str,
        mut spans: Vec<Span>,
        warnings: &mut Vec<SegmentationWarning>,
    ) -> LumiereResult<Vec<Span>> {
        let max_segments = *self.constraints.max_segments();
        if spans.len() <= max_segments {
            return Ok(spans);
        }
        if self.constraints.fails_on_violation() {
            return Err(ScriptError::new(ScriptErrorKind::ConstraintViolationUnresolvable(
                format!("{} segments exceed the limit of {}", spans.len(), max_segments),
            ))
            .into());
        }

        let mut merges = 0;
        while spans.len() > max_segments {
            let smallest = spans
                .iter()
                .enumerate()
                .min_by_key(|(_, span)| span.chars(normalized))
                .map(|(i, _)| i)
                .unwrap_or(0);

            // Merge into the smaller neighbour; the last span can only go left.
            let left = if smallest == 0 {
                0
            } else if smallest + 1 == spans.len() {
                smallest - 1
            } else if spans[smallest - 1].chars(normalized)
                <= spans[smallest + 1].chars(normalized)
            {
                smallest - 1
            } else {
                smallest
            };

            let right = spans.remove(left + 1);
            spans[left].absorb(right);
            merges += 1;
        }

        tracing::debug!(merges, max_segments, "Merged segments to fit limit");
        warnings.push(SegmentationWarning::Merged {
            merges,
            max_segments,
        });
        Ok(spans)
    }

    fn build_segments(
        &self,
        normalized: &str,
        spans: Vec<Span>,
        warnings: &mut Vec<SegmentationWarning>,
    ) -> LumiereResult<Vec<Segment>> {
        let max_tokens = *self.constraints.max_tokens_per_segment();
        let words_per_second = *self.constraints.words_per_second();

        let mut segments = Vec::with_capacity(spans.len());
        for (index, span) in spans.into_iter().enumerate() {
            let raw = normalized[span.start..span.end].trim();
            let original_tokens = estimate_tokens(raw);

            let (text, truncation) = if original_tokens > max_tokens {
                if self.constraints.fails_on_violation() {
                    return Err(ScriptError::new(
                        ScriptErrorKind::ConstraintViolationUnresolvable(format!(
                            "segment {} needs {} tokens, limit is {}",
                            index, original_tokens, max_tokens
                        )),
                    )
                    .into());
                }
                let (text, provenance) = self.truncate(raw, original_tokens);
                warnings.push(SegmentationWarning::Truncated {
                    index,
                    original_tokens,
                    retained_tokens: provenance.retained_tokens,
                });
                (text, Some(provenance))
            } else {
                (raw.to_string(), None)
            };

            let duration = count_words(raw) as f64 / words_per_second;
            segments.push(Segment::new(
                index,
                span.start,
                span.end,
                text.clone(),
                estimate_tokens(&text),
                duration,
                self.constraints.duration_range_for(duration),
                truncation,
                span.confidence,
                span.taxonomy_hints,
            ));
        }
        Ok(segments)
    }

    /// Shorten `text` so that it plus the marker fits the token limit.
    fn truncate(&self, text: &str, original_tokens: usize) -> (String, TruncationProvenance) {
        let marker = self.constraints.truncation_marker();
        let budget = (self.constraints.max_tokens_per_segment() * 4)
            .saturating_sub(marker.chars().count())
            .max(1);

        let cut = text
            .char_indices()
            .nth(budget)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        let prefix = &text[..cut];
        // Prefer ending on a whole word when one fits.
        let at_word_end = text[cut..].starts_with(char::is_whitespace);
        let kept = match prefix.rfind(char::is_whitespace) {
            Some(space) if !at_word_end && space > 0 => prefix[..space].trim_end(),
            _ => prefix.trim_end(),
        };

        let provenance = TruncationProvenance {
            original_tokens,
            retained_tokens: estimate_tokens(kept),
            original_chars: text.chars().count(),
            retained_chars: kept.chars().count(),
        };
        (format!("{}{}", kept, marker), provenance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> ScriptSegmenter {
        ScriptSegmenter::new(SegmentConstraints::default())
    }

    #[test]
    fn test_sentence_spans_tile_text() {
        let text = "One. Two! Three?";
        let spans = segmenter().sentence_spans(text);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans.last().map(|s| s.end), Some(text.len()));
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_long_sentence_split_at_words() {
        let constraints = SegmentConstraints::default()
            .with_max_duration_secs(2.0)
            .with_words_per_second(1.0);
        let text = "a b c d e";
        let spans = ScriptSegmenter::new(constraints).sentence_spans(text);
        let pieces: Vec<_> = spans.iter().map(|s| &text[s.start..s.end]).collect();
        assert_eq!(pieces, vec!["a b ", "c d ", "e"]);
    }

    #[test]
    fn test_truncate_keeps_whole_words() {
        let constraints = SegmentConstraints::default()
            .with_max_tokens_per_segment(3)
            .with_truncation_marker("…".to_string());
        let (text, provenance) =
            ScriptSegmenter::new(constraints).truncate("alpha beta gamma delta", 6);
        assert_eq!(text, "alpha beta…");
        assert_eq!(provenance.retained_chars, 10);
        assert_eq!(provenance.retained_tokens, 3);
        assert_eq!(provenance.original_chars, 22);
    }
}
