//! Core data types for Lumiere.
//!
//! This crate holds the data model shared by every stage of the pipeline:
//! segments produced from a script, takes scheduled by the orchestrator,
//! generation requests and their fingerprints, asset references, and the
//! timeline returned to callers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod asset;
mod generation;
mod request;
mod segment;
mod take;
mod timeline;

pub use asset::{AssetKind, AssetMetadata, AssetRef, ContinuityAnchor};
pub use generation::{GenerationResult, PollStatus, ProviderTaskId, SubmitRequest, TerminalStatus};
pub use request::{
    CostEstimate, Fingerprint, GenerationRequest, ProviderParams, ProviderParamsBuilder,
    QualityTier, normalize_prompt,
};
pub use segment::{
    ProposedBoundary, Segment, SegmentConstraints, SegmentConstraintsBuilder,
    SegmentationMetadata, SegmentationMode, SegmentationOutput, SegmentationWarning,
    SplitStrategy, TruncationProvenance,
};
pub use take::{ContinuityMode, DurationRange, Take, TakeId, TakeStatus};
pub use timeline::{FailureReason, FinalStatus, TakeEvent, Timeline, TimelineEntry};
