//! Layered configuration.
//!
//! Sources, lowest precedence first:
//! - Bundled defaults (`lumiere.toml` compiled into the binary)
//! - `~/.config/lumiere/lumiere.toml`
//! - `./lumiere.toml`
//! - An explicit path, typically from `--config`

use config::{Config, File, FileFormat};
use derive_getters::Getters;
use lumiere_cache::ResultCacheConfig;
use lumiere_core::{ContinuityMode, ProviderParams, SegmentConstraints, SegmentationMode};
use lumiere_error::{ConfigError, ConfigErrorKind, LumiereError, LumiereResult};
use lumiere_orchestrator::{BackoffPolicy, OrchestratorConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

const DEFAULT_CONFIG: &str = include_str!("../../../lumiere.toml");

/// How takes are linked for continuity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct ContinuityConfig {
    /// Continuity mode applied by the planner
    #[serde(default)]
    mode: ContinuityMode,
}

/// Starting balance of the credit ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct LedgerConfig {
    /// Account label used in logs
    #[serde(default = "default_account")]
    account: String,

    /// Prepaid credits granted at startup
    #[serde(default)]
    balance: u64,
}

fn default_account() -> String {
    "default".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            account: default_account(),
            balance: 0,
        }
    }
}

/// Where generated clips and frames are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct StorageConfig {
    /// Asset directory; memory only when unset
    #[serde(default)]
    directory: Option<PathBuf>,
}

/// Provider implementation to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// REST provider over HTTP
    #[default]
    Http,
    /// In-process simulated provider
    Simulated,
}

/// One provider endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct ProviderConfig {
    /// Implementation
    #[serde(default)]
    kind: ProviderKind,

    /// Identity used in fingerprints and logs
    name: String,

    /// API root for HTTP providers
    #[serde(default)]
    base_url: Option<String>,

    /// Model requested from HTTP providers
    #[serde(default)]
    model: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    api_key_env: Option<String>,
}

impl ProviderConfig {
    /// A simulated provider named `name`.
    pub fn simulated(name: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::Simulated,
            name: name.into(),
            base_url: None,
            model: None,
            api_key_env: None,
        }
    }

    /// Read the API key from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no variable is configured or it is unset.
    pub fn api_key(&self) -> LumiereResult<String> {
        let var = self.api_key_env.as_deref().ok_or_else(|| {
            ConfigError::new(ConfigErrorKind::MissingApiKey {
                provider: self.name.clone(),
                detail: "no api_key_env configured".to_string(),
            })
        })?;
        std::env::var(var).map_err(|_| {
            LumiereError::from(ConfigError::new(ConfigErrorKind::MissingApiKey {
                provider: self.name.clone(),
                detail: format!("environment variable {} is not set", var),
            }))
        })
    }

    fn validate(&self) -> LumiereResult<()> {
        if self.name.trim().is_empty() {
            Err(ConfigError::invalid("provider name must not be empty"))?
        }
        if self.kind == ProviderKind::Http && self.base_url.is_none() {
            Err(ConfigError::invalid(format!(
                "http provider '{}' needs a base_url",
                self.name
            )))?
        }
        Ok(())
    }
}

/// Primary provider and optional fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct ProvidersConfig {
    /// Provider every take is fingerprinted against
    primary: ProviderConfig,

    /// Provider used after repeated primary failures
    #[serde(default)]
    fallback: Option<ProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            primary: ProviderConfig::simulated("simulated"),
            fallback: None,
        }
    }
}

/// Frame extractor implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// ffmpeg and ffprobe on `PATH`
    #[default]
    Ffmpeg,
    /// Deterministic digest frames, for simulated runs
    Digest,
}

/// Continuity frame extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct FramesConfig {
    /// Extractor implementation
    #[serde(default)]
    extractor: ExtractorKind,

    /// ffmpeg binary
    #[serde(default = "default_ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe binary
    #[serde(default = "default_ffprobe")]
    ffprobe: PathBuf,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorKind::default(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

/// Complete pipeline configuration.
///
/// # Example
///
/// ```no_run
/// use lumiere::LumiereConfig;
///
/// # fn main() -> lumiere_error::LumiereResult<()> {
/// let config = LumiereConfig::load()?;
/// println!("concurrency: {}", config.orchestrator().concurrency_budget());
/// # Ok(())
/// # }
/// ```
#[derive(
    Debug, Clone, Default, PartialEq, Serialize, Deserialize, Getters, derive_setters::Setters,
)]
#[setters(prefix = "with_")]
pub struct LumiereConfig {
    /// Segment limits
    #[serde(default)]
    segmenter: SegmentConstraints,

    /// Deterministic or assisted segmentation
    #[serde(default)]
    segmentation: SegmentationMode,

    /// Continuity mode
    #[serde(default)]
    continuity: ContinuityConfig,

    /// Batch settings
    #[serde(default)]
    orchestrator: OrchestratorConfig,

    /// Polling, retry and timeout policy
    #[serde(default)]
    backoff: BackoffPolicy,

    /// Default generation parameters
    #[serde(default)]
    generation: ProviderParams,

    /// Starting credits
    #[serde(default)]
    ledger: LedgerConfig,

    /// Result cache
    #[serde(default)]
    cache: ResultCacheConfig,

    /// Asset storage
    #[serde(default)]
    storage: StorageConfig,

    /// Frame extraction
    #[serde(default)]
    frames: FramesConfig,

    /// Providers
    #[serde(default)]
    providers: ProvidersConfig,
}

impl LumiereConfig {
    /// Load with precedence: current dir > home dir > bundled defaults.
    ///
    /// Missing user files are skipped.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a file cannot be parsed or the
    /// merged result fails validation.
    #[instrument]
    pub fn load() -> LumiereResult<Self> {
        Self::load_with(None)
    }

    /// Load the standard layers plus an optional explicit file on top.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the explicit file is missing, any
    /// layer cannot be parsed, or the merged result fails validation.
    #[instrument]
    pub fn load_with(explicit: Option<&Path>) -> LumiereResult<Self> {
        debug!("Loading configuration layers");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(config_dir) = dirs::config_dir() {
            let home_config = config_dir.join("lumiere").join("lumiere.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("lumiere").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder
            .build()
            .map_err(|e| {
                LumiereError::from(ConfigError::new(ConfigErrorKind::Load(e.to_string())))
            })?
            .try_deserialize()
            .map_err(|e| {
                LumiereError::from(ConfigError::new(ConfigErrorKind::Parse(e.to_string())))
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load only the bundled defaults and one file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed,
    /// or the result fails validation.
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> LumiereResult<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                LumiereError::from(ConfigError::new(ConfigErrorKind::Load(format!(
                    "{}: {}",
                    path.as_ref().display(),
                    e
                ))))
            })?
            .try_deserialize()
            .map_err(|e| {
                LumiereError::from(ConfigError::new(ConfigErrorKind::Parse(e.to_string())))
            })?;
        config.validate()?;
        Ok(config)
    }

    /// The bundled defaults alone.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the bundled file is malformed.
    pub fn bundled() -> LumiereResult<Self> {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .and_then(Config::try_deserialize::<Self>)
            .map_err(|e| {
                LumiereError::from(ConfigError::new(ConfigErrorKind::Parse(format!(
                    "bundled defaults: {}",
                    e
                ))))
            })
    }

    /// Check every section.
    ///
    /// # Errors
    ///
    /// Returns the first script, validation or configuration error found.
    pub fn validate(&self) -> LumiereResult<()> {
        self.segmenter.validate()?;
        self.orchestrator.validate()?;
        self.backoff.validate()?;
        self.generation.validate()?;
        if self.cache.directory().is_some() && self.storage.directory.is_none() {
            Err(ConfigError::invalid(
                "cache.directory needs storage.directory; a persistent cache cannot point into memory storage",
            ))?
        }
        self.providers.primary.validate()?;
        if let Some(fallback) = &self.providers.fallback {
            fallback.validate()?;
            if fallback.name == self.providers.primary.name {
                Err(ConfigError::invalid(
                    "fallback provider must have a different name from the primary",
                ))?
            }
        }
        Ok(())
    }
}
