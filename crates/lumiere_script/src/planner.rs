//! Continuity planning.

use lumiere_core::{ContinuityMode, Segment, Take};

/// Maps segments onto takes and adds continuity edges.
///
/// Under a chaining mode every take after the first depends on its
/// immediate predecessor, forming a single path. Under
/// [`ContinuityMode::None`] takes are independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContinuityPlanner {
    mode: ContinuityMode,
}

impl ContinuityPlanner {
    /// Create a planner for `mode`.
    pub fn new(mode: ContinuityMode) -> Self {
        Self { mode }
    }

    /// Continuity mode in force.
    pub fn mode(&self) -> ContinuityMode {
        self.mode
    }

    /// Build one pending take per segment, in segment order.
    #[tracing::instrument(skip(self, segments), fields(mode = %self.mode, segments = segments.len()))]
    pub fn plan(&self, segments: &[Segment]) -> Vec<Take> {
        let mut takes: Vec<Take> = Vec::with_capacity(segments.len());
        for (index, segment) in segments.iter().enumerate() {
            let take = Take::new(index, segment.text().clone(), *segment.target_duration());
            let take = match takes.last() {
                Some(previous) if self.mode.chains() => take.with_dependency(*previous.id()),
                _ => take,
            };
            takes.push(take);
        }
        tracing::debug!(takes = takes.len(), "Takes planned");
        takes
    }
}
