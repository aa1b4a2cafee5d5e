//! Result cache error types.

/// Kinds of cache failures.
///
/// None of these reach callers of the cache lookup path; they are logged and
/// treated as a miss.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum CacheErrorKind {
    /// Entry exists but cannot be trusted
    #[display("Corrupt cache entry {}: {}", fingerprint, reason)]
    Corrupt {
        /// Fingerprint of the entry
        fingerprint: String,
        /// Why the entry was rejected
        reason: String,
    },
    /// Filesystem failure
    #[display("Cache I/O error: {}", _0)]
    Io(String),
    /// Entry could not be encoded
    #[display("Cache serialization error: {}", _0)]
    Serialization(String),
}

/// Cache error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Cache Error: {} at line {} in {}", kind, line, file)]
pub struct CacheError {
    /// The kind of error that occurred
    pub kind: CacheErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl CacheError {
    /// Create a new cache error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: CacheErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
