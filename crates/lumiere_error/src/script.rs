//! Script segmentation error types.

/// Kinds of segmentation failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ScriptErrorKind {
    /// Script was empty or contained only whitespace
    #[display("Script is empty or whitespace-only")]
    EmptyScript,
    /// Constraints contradict each other
    #[display("Invalid constraints: {}", _0)]
    InvalidConstraints(String),
    /// Strict limits were exceeded and automatic adjustment is disabled
    #[display("Constraint violation cannot be resolved: {}", _0)]
    ConstraintViolationUnresolvable(String),
}

impl ScriptErrorKind {
    /// Whether this failure stems from invalid caller input rather than the script shape.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ScriptErrorKind::EmptyScript | ScriptErrorKind::InvalidConstraints(_)
        )
    }
}

/// Segmentation error with location tracking.
///
/// # Examples
///
/// ```
/// use lumiere_error::{ScriptError, ScriptErrorKind};
///
/// let err = ScriptError::new(ScriptErrorKind::EmptyScript);
/// assert!(format!("{}", err).contains("empty"));
/// assert!(err.kind.is_validation());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Script Error: {} at line {} in {}", kind, line, file)]
pub struct ScriptError {
    /// The kind of error that occurred
    pub kind: ScriptErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl ScriptError {
    /// Create a new script error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ScriptErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
