//! Error types for the Lumiere pipeline.
//!
//! This crate provides the foundation error types used throughout the Lumiere workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use lumiere_error::{LumiereResult, ScriptError, ScriptErrorKind};
//!
//! fn segment(script: &str) -> LumiereResult<usize> {
//!     if script.trim().is_empty() {
//!         Err(ScriptError::new(ScriptErrorKind::EmptyScript))?
//!     }
//!     Ok(script.split_whitespace().count())
//! }
//!
//! assert!(segment("   ").is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod frame;
mod ledger;
mod orchestrator;
mod provider;
mod script;
mod storage;
mod validation;

pub use cache::{CacheError, CacheErrorKind};
pub use config::{ConfigError, ConfigErrorKind};
pub use error::{LumiereError, LumiereErrorKind, LumiereResult};
pub use frame::{FrameError, FrameErrorKind};
pub use ledger::{LedgerError, LedgerErrorKind};
pub use orchestrator::{OrchestratorError, OrchestratorErrorKind};
pub use provider::{ProviderError, ProviderErrorKind, ProviderResult, RetryableError};
pub use script::{ScriptError, ScriptErrorKind};
pub use storage::{StorageError, StorageErrorKind};
pub use validation::{ValidationError, ValidationErrorKind};
