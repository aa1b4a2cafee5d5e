//! Script handling for Lumiere.
//!
//! [`ScriptSegmenter`] turns a raw script into contiguous, bounded segments,
//! and [`ContinuityPlanner`] maps those segments onto takes, adding
//! dependency edges when visual continuity is requested.
//!
//! # Example
//!
//! ```rust
//! use lumiere_core::{ContinuityMode, SegmentConstraints, SegmentationMode};
//! use lumiere_script::{ContinuityPlanner, ScriptSegmenter};
//!
//! # async fn example() -> lumiere_error::LumiereResult<()> {
//! let segmenter = ScriptSegmenter::new(SegmentConstraints::default().with_max_segments(3));
//! let output = segmenter
//!     .segment("A. B. C.", SegmentationMode::default(), None)
//!     .await?;
//! assert_eq!(output.segments().len(), 3);
//!
//! let takes = ContinuityPlanner::new(ContinuityMode::Adjacent).plan(output.segments());
//! assert_eq!(takes[1].depends_on(), &Some(*takes[0].id()));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod normalize;
mod planner;
mod segmenter;
mod tokens;

pub use normalize::normalize_script;
pub use planner::ContinuityPlanner;
pub use segmenter::ScriptSegmenter;
pub use tokens::{count_words, estimate_duration_secs, estimate_tokens};
