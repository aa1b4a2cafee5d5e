//! Takes and their lifecycle states.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a take.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[display("{}", _0)]
pub struct TakeId(Uuid);

impl TakeId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TakeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Inclusive range of clip durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct DurationRange {
    /// Shortest acceptable clip.
    min_secs: f64,
    /// Longest acceptable clip; used as the requested duration.
    max_secs: f64,
}

impl DurationRange {
    /// Create a range, swapping the bounds if they arrive reversed.
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        if min_secs <= max_secs {
            Self { min_secs, max_secs }
        } else {
            Self {
                min_secs: max_secs,
                max_secs: min_secs,
            }
        }
    }

    /// Duration sent to the provider.
    pub fn target_secs(&self) -> f64 {
        self.max_secs
    }

    /// Whether `secs` falls inside the range.
    pub fn contains(&self, secs: f64) -> bool {
        secs >= self.min_secs && secs <= self.max_secs
    }
}

/// How takes are chained for visual continuity.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum ContinuityMode {
    /// Takes are independent.
    #[default]
    #[display("none")]
    None,
    /// Each take is seeded by its immediate predecessor.
    #[display("adjacent")]
    Adjacent,
    /// Every take belongs to a single chain from the first take.
    #[display("full_chain")]
    FullChain,
}

impl ContinuityMode {
    /// Whether this mode creates dependency edges.
    pub fn chains(&self) -> bool {
        !matches!(self, ContinuityMode::None)
    }
}

impl std::str::FromStr for ContinuityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ContinuityMode::None),
            "adjacent" => Ok(ContinuityMode::Adjacent),
            "full_chain" | "full-chain" | "fullchain" => Ok(ContinuityMode::FullChain),
            _ => Err(format!("Unknown continuity mode: {}", s)),
        }
    }
}

/// Lifecycle state of a take inside the orchestrator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum TakeStatus {
    /// Created by planning, not yet examined.
    #[display("pending")]
    Pending,
    /// Looking up the result cache.
    #[display("cache_check")]
    CacheCheck,
    /// Cache had a result for the fingerprint.
    #[display("cache_hit")]
    CacheHit,
    /// Cache had nothing for the fingerprint.
    #[display("cache_miss")]
    CacheMiss,
    /// Holding credits for the attempt.
    #[display("reserving")]
    Reserving,
    /// Sending the request to a provider.
    #[display("submitting")]
    Submitting,
    /// Waiting for the provider task to finish.
    #[display("polling")]
    Polling,
    /// Provider produced an asset.
    #[display("succeeded")]
    Succeeded,
    /// Pulling the continuity frame out of the asset.
    #[display("extracting_anchor")]
    ExtractingAnchor,
    /// Terminal success.
    #[display("committed")]
    Committed,
    /// An attempt failed, or terminal failure after rollback.
    #[display("failed")]
    Failed,
    /// Waiting before another attempt.
    #[display("retrying")]
    Retrying,
    /// Switching to the secondary provider.
    #[display("fallback_provider")]
    FallbackProvider,
    /// Reservation released after giving up.
    #[display("rolled_back")]
    RolledBack,
}

impl TakeStatus {
    /// Whether no further transitions can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TakeStatus::Committed | TakeStatus::Failed)
    }
}

/// One unit of script mapped to a single generated clip.
///
/// # Examples
///
/// ```
/// use lumiere_core::{DurationRange, Take, TakeStatus};
///
/// let first = Take::new(0, "A quiet harbor at dawn.", DurationRange::new(2.0, 4.0));
/// let second = Take::new(1, "Gulls lift off.", DurationRange::new(2.0, 3.0))
///     .with_dependency(*first.id());
///
/// assert_eq!(*first.status(), TakeStatus::Pending);
/// assert_eq!(second.depends_on(), &Some(*first.id()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Take {
    /// Stable identifier.
    id: TakeId,
    /// Position in the total order.
    index: usize,
    /// Prompt text for the clip.
    text: String,
    /// Acceptable clip duration.
    target_duration: DurationRange,
    /// Predecessor whose final frame seeds this take.
    depends_on: Option<TakeId>,
    /// Current lifecycle state.
    status: TakeStatus,
}

impl Take {
    /// Create a pending take with a fresh id.
    pub fn new(index: usize, text: impl Into<String>, target_duration: DurationRange) -> Self {
        Self {
            id: TakeId::new(),
            index,
            text: text.into(),
            target_duration,
            depends_on: None,
            status: TakeStatus::Pending,
        }
    }

    /// Attach a continuity dependency.
    pub fn with_dependency(mut self, predecessor: TakeId) -> Self {
        self.depends_on = Some(predecessor);
        self
    }

    /// Return a copy carrying a new status.
    ///
    /// Status changes belong to the orchestrator; other stages only create
    /// takes in [`TakeStatus::Pending`].
    pub fn with_status(mut self, status: TakeStatus) -> Self {
        self.status = status;
        self
    }
}
