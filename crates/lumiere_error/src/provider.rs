//! Provider error types and retry classification.

/// Provider failure conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ProviderErrorKind {
    /// HTTP error with status code and message
    #[display("HTTP {} error: {}", status_code, message)]
    Http {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },
    /// Connection-level failure
    #[display("Network error: {}", _0)]
    Network(String),
    /// Call did not complete in time
    #[display("Timed out: {}", _0)]
    Timeout(String),
    /// Task id unknown to the provider (often indexing lag right after submit)
    #[display("Task not found: {}", _0)]
    NotFound(String),
    /// Credentials rejected
    #[display("Unauthorized: {}", _0)]
    Unauthorized(String),
    /// Request rejected as malformed
    #[display("Malformed request: {}", _0)]
    MalformedRequest(String),
    /// Response could not be interpreted
    #[display("Invalid response: {}", _0)]
    InvalidResponse(String),
    /// Provider reported the task itself as failed
    #[display("Task failed: {}", _0)]
    TaskFailed(String),
    /// Task was cancelled before it produced a clip
    #[display("Task cancelled: {}", _0)]
    Cancelled(String),
    /// Provider client could not be constructed
    #[display("Client creation failed: {}", _0)]
    ClientCreation(String),
}

impl ProviderErrorKind {
    /// Check if this error type should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderErrorKind::Http { status_code, .. } => {
                matches!(*status_code, 408 | 429 | 500 | 502 | 503 | 504)
            }
            ProviderErrorKind::Network(_) => true,
            ProviderErrorKind::Timeout(_) => true,
            ProviderErrorKind::NotFound(_) => true,
            ProviderErrorKind::TaskFailed(_) => true,
            _ => false,
        }
    }

    /// In-call retry plan for this error.
    ///
    /// Returns `(initial_backoff_ms, max_retries, max_delay_secs)`. Quota
    /// errors back off longest; gateway hiccups retry quickly and briefly.
    /// Video queues are slow, so an overloaded provider gets a long tail.
    pub fn retry_strategy_params(&self) -> (u64, usize, u64) {
        match self {
            ProviderErrorKind::Http { status_code, .. } => match *status_code {
                429 => (8000, 4, 60),
                503 => (4000, 5, 90),
                500 | 502 | 504 => (1000, 3, 10),
                408 => (3000, 3, 30),
                _ => (2000, 3, 30),
            },
            ProviderErrorKind::Network(_) => (1000, 4, 15),
            ProviderErrorKind::Timeout(_) => (3000, 2, 30),
            _ => (2000, 3, 30),
        }
    }
}

/// Provider error with source location tracking.
///
/// # Examples
///
/// ```
/// use lumiere_error::{ProviderError, ProviderErrorKind, RetryableError};
///
/// let err = ProviderError::new(ProviderErrorKind::Unauthorized("bad key".to_string()));
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Provider Error: {} at line {} in {}", kind, line, file)]
pub struct ProviderError {
    /// The kind of error that occurred
    pub kind: ProviderErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl ProviderError {
    /// Create a new ProviderError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ProviderErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Classify an HTTP status into the matching kind.
    #[track_caller]
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = match status_code {
            400 | 422 => ProviderErrorKind::MalformedRequest(message),
            401 | 403 => ProviderErrorKind::Unauthorized(message),
            404 => ProviderErrorKind::NotFound(message),
            _ => ProviderErrorKind::Http {
                status_code,
                message,
            },
        };
        Self::new(kind)
    }

    /// True when the provider does not (yet) know the task.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ProviderErrorKind::NotFound(_))
    }
}

/// Result type for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Trait for errors that support retry logic.
///
/// # Examples
///
/// ```
/// use lumiere_error::{ProviderError, RetryableError};
///
/// let err = ProviderError::from_status(503, "Service unavailable");
///
/// assert!(err.is_retryable());
/// let (backoff, retries, max_delay) = err.retry_strategy_params();
/// assert_eq!(backoff, 4000);
/// assert_eq!(retries, 5);
/// assert_eq!(max_delay, 90);
/// ```
pub trait RetryableError {
    /// Returns true if this error should trigger a retry.
    ///
    /// Transient errors like 503, 429 or network timeouts return true.
    /// Permanent errors like 401 or 400 return false.
    fn is_retryable(&self) -> bool;

    /// Get retry strategy parameters for this error.
    ///
    /// Returns `(initial_backoff_ms, max_retries, max_delay_secs)`.
    fn retry_strategy_params(&self) -> (u64, usize, u64) {
        (2000, 3, 30)
    }
}

impl RetryableError for ProviderError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn retry_strategy_params(&self) -> (u64, usize, u64) {
        self.kind.retry_strategy_params()
    }
}
