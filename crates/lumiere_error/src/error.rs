//! Top-level error wrapper types.

use crate::{
    CacheError, ConfigError, FrameError, LedgerError, OrchestratorError, ProviderError,
    ScriptError, StorageError, ValidationError,
};

/// Every error family raised inside the workspace.
///
/// # Examples
///
/// ```
/// use lumiere_error::{LumiereError, LumiereErrorKind, ProviderError};
///
/// let provider_err = ProviderError::from_status(502, "Bad gateway");
/// let err: LumiereError = provider_err.into();
/// assert!(matches!(err.kind(), LumiereErrorKind::Provider(_)));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum LumiereErrorKind {
    /// Script segmentation error
    #[from(ScriptError)]
    Script(ScriptError),
    /// Input validation error
    #[from(ValidationError)]
    Validation(ValidationError),
    /// Credit ledger error
    #[from(LedgerError)]
    Ledger(LedgerError),
    /// External provider error
    #[from(ProviderError)]
    Provider(ProviderError),
    /// Result cache error
    #[from(CacheError)]
    Cache(CacheError),
    /// Asset storage error
    #[from(StorageError)]
    Storage(StorageError),
    /// Frame extraction error
    #[from(FrameError)]
    Frame(FrameError),
    /// Orchestration error
    #[from(OrchestratorError)]
    Orchestrator(OrchestratorError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
}

/// Lumiere error with kind discrimination.
///
/// # Examples
///
/// ```
/// use lumiere_error::{ConfigError, LumiereResult};
///
/// fn might_fail() -> LumiereResult<()> {
///     Err(ConfigError::invalid("missing field"))?
/// }
///
/// assert!(might_fail().is_err());
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Lumiere Error: {}", _0)]
pub struct LumiereError(Box<LumiereErrorKind>);

impl LumiereError {
    /// Create a new error from a kind.
    pub fn new(kind: LumiereErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &LumiereErrorKind {
        &self.0
    }

    /// Consume the wrapper and return the kind.
    pub fn into_kind(self) -> LumiereErrorKind {
        *self.0
    }
}

// Generic From implementation for any type that converts to LumiereErrorKind
impl<T> From<T> for LumiereError
where
    T: Into<LumiereErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Lumiere operations.
pub type LumiereResult<T> = std::result::Result<T, LumiereError>;
