//! Frame extraction error types.

/// Kinds of frame extraction failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum FrameErrorKind {
    /// Time fraction outside `[0.0, 1.0]`
    #[display("Invalid time fraction: {}", _0)]
    InvalidFraction(String),
    /// External tool could not be started
    #[display("Failed to spawn {}: {}", tool, message)]
    Spawn {
        /// Tool name
        tool: String,
        /// OS error message
        message: String,
    },
    /// Probe output unusable
    #[display("Probe failed: {}", _0)]
    Probe(String),
    /// Extraction command failed
    #[display("Extraction failed: {}", _0)]
    Extraction(String),
    /// Temporary file handling failed
    #[display("Scratch file error: {}", _0)]
    Scratch(String),
}

/// Frame extraction error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Frame Error: {} at line {} in {}", kind, line, file)]
pub struct FrameError {
    /// The kind of error that occurred
    pub kind: FrameErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl FrameError {
    /// Create a new frame error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: FrameErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
