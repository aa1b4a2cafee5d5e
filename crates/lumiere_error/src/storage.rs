//! Asset storage error types.

/// Ways persisting or loading clip and frame bytes can fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum StorageErrorKind {
    /// Asset directory tree could not be created
    #[display("Failed to create asset directory: {}", _0)]
    DirectoryCreation(String),
    /// Temp write or rename into place failed
    #[display("Failed to write asset: {}", _0)]
    FileWrite(String),
    /// Stored bytes could not be read back
    #[display("Failed to read asset: {}", _0)]
    FileRead(String),
    /// No bytes stored under the reference
    #[display("Asset not found: {}", _0)]
    NotFound(String),
    /// Stored bytes no longer match their content hash
    #[display("Hash mismatch: expected {}, got {}", expected, actual)]
    HashMismatch {
        /// Hash recorded in the reference
        expected: String,
        /// Hash of the bytes read back
        actual: String,
    },
    /// Reference belongs to a different backend
    #[display("Reference belongs to backend '{}'", _0)]
    ForeignReference(String),
}

/// Asset store error, tagged with where it was raised.
///
/// # Examples
///
/// ```
/// use lumiere_error::{StorageError, StorageErrorKind};
///
/// let err = StorageError::new(StorageErrorKind::NotFound("abc123".to_string()));
/// assert!(format!("{}", err).contains("not found"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Storage Error: {} at line {} in {}", kind, line, file)]
pub struct StorageError {
    /// The kind of error that occurred
    pub kind: StorageErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl StorageError {
    /// Wrap `kind`, recording the caller's location.
    #[track_caller]
    pub fn new(kind: StorageErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
