//! Trait definitions for the external collaborators of the pipeline.
//!
//! The core only depends on these contracts; concrete providers, proposers
//! and extractors live in `lumiere_models`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod traits;

pub use traits::{BoundaryProposer, ExternalProvider, FrameExtractor};
