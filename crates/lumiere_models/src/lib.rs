//! Collaborator implementations for Lumiere.
//!
//! This crate provides concrete implementations of the traits defined in
//! `lumiere_interface`:
//!
//! - [`HttpVideoProvider`]: REST video generation provider (submit, poll,
//!   download, cancel) with request-level retry
//! - [`SimulatedProvider`]: deterministic in-process provider with scripted
//!   outcomes, used by tests and dry runs
//! - [`FfmpegFrameExtractor`] and [`DigestFrameExtractor`]: continuity frame
//!   extraction
//! - [`KeywordBoundaryProposer`]: scene-heading boundary proposer
//!
//! # Example
//!
//! ```rust
//! use lumiere_core::{ProviderParams, SubmitRequest, PollStatus};
//! use lumiere_interface::ExternalProvider;
//! use lumiere_models::SimulatedProvider;
//!
//! # async fn example() -> lumiere_error::ProviderResult<()> {
//! let provider = SimulatedProvider::new("sim");
//! let request = SubmitRequest::new("A lighthouse".to_string(), ProviderParams::default(), None);
//! let task = provider.submit(&request).await?;
//! assert!(matches!(provider.poll(&task).await?, PollStatus::Succeeded { .. }));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod ffmpeg;
mod http;
mod keyword;
mod simulated;

pub use ffmpeg::FfmpegFrameExtractor;
pub use http::HttpVideoProvider;
pub use keyword::KeywordBoundaryProposer;
pub use simulated::{DigestFrameExtractor, ScriptedOutcome, SimulatedProvider, SubmissionRecord};
