//! Continuity anchors awaiting their dependent take.

use lumiere_core::{ContinuityAnchor, TakeId};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Anchors keyed by the take they were extracted from.
///
/// A take's anchor is inserted once after it commits and removed by its
/// single dependent, so no anchor is ever consumed twice.
#[derive(Debug, Default)]
pub struct AnchorArena {
    anchors: Mutex<HashMap<TakeId, ContinuityAnchor>>,
}

impl AnchorArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the anchor for its take, replacing any earlier one.
    pub async fn insert(&self, anchor: ContinuityAnchor) {
        let take_id = *anchor.take_id();
        self.anchors.lock().await.insert(take_id, anchor);
    }

    /// Remove and return the anchor extracted from `take_id`.
    pub async fn take(&self, take_id: &TakeId) -> Option<ContinuityAnchor> {
        self.anchors.lock().await.remove(take_id)
    }

    /// Number of unconsumed anchors.
    pub async fn len(&self) -> usize {
        self.anchors.lock().await.len()
    }

    /// Whether every anchor has been consumed.
    pub async fn is_empty(&self) -> bool {
        self.anchors.lock().await.is_empty()
    }
}
