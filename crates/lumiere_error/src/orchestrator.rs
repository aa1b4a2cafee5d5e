//! Orchestration error types.

/// Kinds of orchestration failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum OrchestratorErrorKind {
    /// State machine was asked to make a transition it does not allow
    #[display("Illegal take transition {} -> {}", from, to)]
    IllegalTransition {
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },
    /// Batch was cancelled
    #[display("Batch cancelled")]
    Cancelled,
    /// Worker task aborted unexpectedly
    #[display("Worker task failed: {}", _0)]
    Worker(String),
}

/// Orchestration error with location tracking.
///
/// # Examples
///
/// ```
/// use lumiere_error::{OrchestratorError, OrchestratorErrorKind};
///
/// let err = OrchestratorError::new(OrchestratorErrorKind::Cancelled);
/// assert!(format!("{}", err).contains("cancelled"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Orchestrator Error: {} at line {} in {}", kind, line, file)]
pub struct OrchestratorError {
    /// The kind of error that occurred
    pub kind: OrchestratorErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl OrchestratorError {
    /// Create a new orchestrator error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: OrchestratorErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
