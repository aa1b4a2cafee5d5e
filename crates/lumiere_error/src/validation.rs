//! Input validation error types.

/// Kinds of validation failures detected before any credits are touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ValidationErrorKind {
    /// Generation parameters are out of range
    #[display("Invalid generation parameters: {}", _0)]
    InvalidParams(String),
    /// The take dependency graph is not a set of simple chains
    #[display("Invalid take graph: {}", _0)]
    InvalidTakeGraph(String),
    /// Concurrency budget must be at least one
    #[display("Concurrency budget must be at least 1, got {}", _0)]
    InvalidConcurrency(usize),
}

/// Validation error with location tracking.
///
/// # Examples
///
/// ```
/// use lumiere_error::{ValidationError, ValidationErrorKind};
///
/// let err = ValidationError::new(ValidationErrorKind::InvalidConcurrency(0));
/// assert!(format!("{}", err).contains("at least 1"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Validation Error: {} at line {} in {}", kind, line, file)]
pub struct ValidationError {
    /// The kind of error that occurred
    pub kind: ValidationErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl ValidationError {
    /// Create a new validation error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ValidationErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
