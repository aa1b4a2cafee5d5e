//! Timeline returned at the end of a batch.

use crate::{AssetRef, Fingerprint, GenerationResult, Take, TakeId, TakeStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a take ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Predecessor failed, so this take was never submitted
    #[display("dependency failed")]
    DependencyFailed,
    /// Reservation refused
    #[display("insufficient budget: {}", _0)]
    InsufficientBudget(String),
    /// Provider rejected the request outright
    #[display("provider rejected request: {}", _0)]
    ProviderPermanent(String),
    /// Every allowed attempt failed
    #[display("gave up after {} attempts: {}", attempts, last_error)]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Last error seen
        last_error: String,
    },
    /// Provider never acknowledged the task within the grace window
    #[display("task not found after grace window: {}", _0)]
    TaskNotFound(String),
    /// Per-take deadline elapsed
    #[display("timed out after {} seconds", _0)]
    TimedOut(u64),
    /// Batch was cancelled
    #[display("cancelled")]
    Cancelled,
    /// Asset could not be persisted
    #[display("storage failure: {}", _0)]
    Storage(String),
    /// Continuity frame could not be produced
    #[display("anchor extraction failed: {}", _0)]
    AnchorExtraction(String),
    /// Request parameters rejected before submission
    #[display("invalid request: {}", _0)]
    InvalidRequest(String),
    /// Ledger rejected a commit or release
    #[display("ledger failure: {}", _0)]
    Ledger(String),
    /// Orchestrator bookkeeping went wrong
    #[display("internal error: {}", _0)]
    Internal(String),
}

/// Terminal status reported per take.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    /// Clip produced and paid for (or served from cache)
    #[display("committed")]
    Committed,
    /// No clip for this take
    #[display("failed")]
    Failed,
}

/// Outcome of one take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct TimelineEntry {
    /// Take in its terminal state
    take: Take,
    /// Terminal status
    final_status: FinalStatus,
    /// Present when failed
    failure: Option<FailureReason>,
    /// Clip for committed takes
    asset: Option<AssetRef>,
    /// Request fingerprint, when one was computed
    fingerprint: Option<Fingerprint>,
    /// Served from cache
    cache_hit: bool,
    /// Provider submissions made
    attempts: u32,
    /// Provider that produced the clip
    provider: Option<String>,
    /// Credits committed for this take
    credits_charged: u64,
    /// Last provider result
    result: Option<GenerationResult>,
    /// States visited, in order
    transitions: Vec<TakeStatus>,
    /// When the take reached its terminal state
    finished_at: DateTime<Utc>,
}

impl TimelineEntry {
    /// Entry for a committed take.
    #[allow(clippy::too_many_arguments)]
    pub fn committed(
        take: Take,
        asset: AssetRef,
        fingerprint: Fingerprint,
        cache_hit: bool,
        attempts: u32,
        provider: Option<String>,
        credits_charged: u64,
        result: Option<GenerationResult>,
        transitions: Vec<TakeStatus>,
    ) -> Self {
        Self {
            take: take.with_status(TakeStatus::Committed),
            final_status: FinalStatus::Committed,
            failure: None,
            asset: Some(asset),
            fingerprint: Some(fingerprint),
            cache_hit,
            attempts,
            provider,
            credits_charged,
            result,
            transitions,
            finished_at: Utc::now(),
        }
    }

    /// Entry for a failed take.
    #[allow(clippy::too_many_arguments)]
    pub fn failed(
        take: Take,
        reason: FailureReason,
        fingerprint: Option<Fingerprint>,
        attempts: u32,
        provider: Option<String>,
        credits_charged: u64,
        result: Option<GenerationResult>,
        transitions: Vec<TakeStatus>,
    ) -> Self {
        Self {
            take: take.with_status(TakeStatus::Failed),
            final_status: FinalStatus::Failed,
            failure: Some(reason),
            asset: None,
            fingerprint,
            cache_hit: false,
            attempts,
            provider,
            credits_charged,
            result,
            transitions,
            finished_at: Utc::now(),
        }
    }

    /// Whether the take committed.
    pub fn is_committed(&self) -> bool {
        self.final_status == FinalStatus::Committed
    }
}

/// Ordered outcome of a batch, read-only once returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Build a timeline ordered by take index.
    pub fn new(mut entries: Vec<TimelineEntry>) -> Self {
        entries.sort_by_key(|e| *e.take().index());
        Self { entries }
    }

    /// Entries in take order.
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Entry for the take at `index`.
    pub fn entry(&self, index: usize) -> Option<&TimelineEntry> {
        self.entries.iter().find(|e| *e.take().index() == index)
    }

    /// Entry for a take id.
    pub fn entry_by_id(&self, id: &TakeId) -> Option<&TimelineEntry> {
        self.entries.iter().find(|e| e.take().id() == id)
    }

    /// Number of committed takes.
    pub fn committed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_committed()).count()
    }

    /// Number of failed takes.
    pub fn failed_count(&self) -> usize {
        self.entries.len() - self.committed_count()
    }

    /// Whether every take committed.
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(TimelineEntry::is_committed)
    }

    /// Sum of credits committed across the batch.
    pub fn total_credits(&self) -> u64 {
        self.entries.iter().map(|e| e.credits_charged).sum()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the timeline is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// State change notification emitted while a batch runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeEvent {
    /// Take that changed
    pub take_id: TakeId,
    /// Take position
    pub index: usize,
    /// New state
    pub status: TakeStatus,
    /// Current attempt number (0 before the first submission)
    pub attempt: u32,
}
