//! Configuration error types.

/// What went wrong while assembling configuration.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ConfigErrorKind {
    /// A configuration source could not be read or merged
    #[display("Failed to load configuration: {}", _0)]
    Load(String),
    /// Merged configuration did not match the expected shape
    #[display("Failed to parse configuration: {}", _0)]
    Parse(String),
    /// A value is present but unusable
    #[display("Invalid configuration: {}", _0)]
    Invalid(String),
    /// A provider's API key could not be found
    #[display("Missing API key for provider '{}': {}", provider, detail)]
    MissingApiKey {
        /// Provider name
        provider: String,
        /// Which variable was expected, if any
        detail: String,
    },
    /// A configured collaborator could not be reached or used
    #[display("Collaborator unavailable: {}", _0)]
    Unavailable(String),
}

/// Configuration error with source location.
///
/// # Examples
///
/// ```
/// use lumiere_error::{ConfigError, ConfigErrorKind};
///
/// let err = ConfigError::new(ConfigErrorKind::Invalid("concurrency must be positive".into()));
/// assert!(err.to_string().contains("concurrency"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", kind, line, file)]
pub struct ConfigError {
    /// The kind of error that occurred
    pub kind: ConfigErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl ConfigError {
    /// Create a new configuration error at the caller's location.
    #[track_caller]
    pub fn new(kind: ConfigErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Shorthand for [`ConfigErrorKind::Invalid`].
    #[track_caller]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Invalid(message.into()))
    }
}
