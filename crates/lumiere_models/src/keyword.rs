//! Rule-based boundary proposer.

use async_trait::async_trait;
use lumiere_core::{ProposedBoundary, SegmentConstraints};
use lumiere_error::LumiereResult;
use lumiere_interface::BoundaryProposer;
use regex::Regex;
use std::sync::LazyLock;

static SCENE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:INT\./EXT\.|I/E\.|INT\.|EXT\.|EST\.)").expect("Valid scene heading regex")
});

static TRANSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:CUT TO:|FADE IN:|FADE OUT\.|DISSOLVE TO:|SMASH CUT TO:|MATCH CUT TO:)")
        .expect("Valid transition regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Heading,
    Transition,
    Paragraph,
}

/// Proposes cuts at screenplay scene headings, transitions and paragraph
/// breaks.
///
/// Blocks opened by a scene heading (`INT.`, `EXT.`, ...) or transition
/// (`CUT TO:`, ...) carry high confidence; plain paragraph breaks carry a
/// lower, configurable confidence.
#[derive(Debug, Clone)]
pub struct KeywordBoundaryProposer {
    heading_confidence: f32,
    paragraph_confidence: f32,
}

impl Default for KeywordBoundaryProposer {
    fn default() -> Self {
        Self {
            heading_confidence: 0.95,
            paragraph_confidence: 0.6,
        }
    }
}

impl KeywordBoundaryProposer {
    /// Create a proposer with default confidences.
    pub fn new() -> Self {
        Self::default()
    }

    /// Confidence assigned to paragraph breaks.
    pub fn with_paragraph_confidence(mut self, confidence: f32) -> Self {
        self.paragraph_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    fn classify_line(line: &str) -> Option<BlockKind> {
        let line = line.trim_start();
        if SCENE_HEADING.is_match(line) {
            Some(BlockKind::Heading)
        } else if TRANSITION.is_match(line) {
            Some(BlockKind::Transition)
        } else {
            None
        }
    }

    fn hints(kind: BlockKind, first_line: &str) -> Vec<String> {
        match kind {
            BlockKind::Heading => {
                let mut hints = vec!["scene_heading".to_string()];
                if first_line.starts_with("EXT.") {
                    hints.push("exterior".to_string());
                } else if first_line.starts_with("INT.") {
                    hints.push("interior".to_string());
                }
                hints
            }
            BlockKind::Transition => vec!["transition".to_string()],
            BlockKind::Paragraph => vec!["paragraph".to_string()],
        }
    }

    /// Split `text` into blocks, each opened by a heading, transition or
    /// paragraph break.
    fn blocks(text: &str) -> Vec<(BlockKind, String)> {
        let mut blocks: Vec<(BlockKind, Vec<&str>)> = Vec::new();
        let mut after_blank = true;

        for line in text.lines() {
            if line.trim().is_empty() {
                after_blank = true;
                continue;
            }
            let opener = Self::classify_line(line).or(after_blank.then_some(BlockKind::Paragraph));
            match (opener, blocks.last_mut()) {
                (None, Some((_, lines))) => lines.push(line),
                (kind, _) => blocks.push((kind.unwrap_or(BlockKind::Paragraph), vec![line])),
            }
            after_blank = false;
        }

        blocks
            .into_iter()
            .map(|(kind, lines)| (kind, lines.join("\n")))
            .collect()
    }
}

#[async_trait]
impl BoundaryProposer for KeywordBoundaryProposer {
    async fn classify(
        &self,
        text: &str,
        _constraints: &SegmentConstraints,
    ) -> LumiereResult<Vec<ProposedBoundary>> {
        let proposals: Vec<ProposedBoundary> = Self::blocks(text)
            .into_iter()
            .map(|(kind, block)| {
                let confidence = match kind {
                    BlockKind::Heading | BlockKind::Transition => self.heading_confidence,
                    BlockKind::Paragraph => self.paragraph_confidence,
                };
                let first_line = block.lines().next().unwrap_or_default().to_string();
                ProposedBoundary::new(block, confidence, Self::hints(kind, &first_line))
            })
            .collect();
        tracing::debug!(boundaries = proposals.len(), "Keyword boundaries proposed");
        Ok(proposals)
    }
}
