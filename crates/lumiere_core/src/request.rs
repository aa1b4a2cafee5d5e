//! Generation requests, fingerprints and cost estimation.

use crate::AssetRef;
use lumiere_error::{ValidationError, ValidationErrorKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Output quality tier, which determines price.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Draft quality
    #[display("basic")]
    Basic,
    /// Production quality
    #[default]
    #[display("pro")]
    Pro,
    /// Highest quality
    #[display("cinema")]
    Cinema,
}

impl QualityTier {
    /// Credits charged per minute of generated footage.
    pub fn credits_per_minute(&self) -> u64 {
        match self {
            QualityTier::Basic => 10,
            QualityTier::Pro => 30,
            QualityTier::Cinema => 80,
        }
    }
}

impl std::str::FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(QualityTier::Basic),
            "pro" => Ok(QualityTier::Pro),
            "cinema" => Ok(QualityTier::Cinema),
            _ => Err(format!("Unknown quality tier: {}", s)),
        }
    }
}

/// Quality parameters sent with every request.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    derive_getters::Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
#[builder(default)]
pub struct ProviderParams {
    /// Quality tier
    #[serde(default)]
    quality: QualityTier,
    /// Requested clip duration in seconds
    #[serde(default = "default_duration_secs")]
    duration_secs: f64,
    /// Aspect ratio such as "16:9"
    #[serde(default = "default_aspect_ratio")]
    aspect_ratio: String,
    /// Provider-side random seed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    /// What the provider should avoid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
}

fn default_duration_secs() -> f64 {
    5.0
}

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

impl Default for ProviderParams {
    fn default() -> Self {
        Self {
            quality: QualityTier::default(),
            duration_secs: default_duration_secs(),
            aspect_ratio: default_aspect_ratio(),
            seed: None,
            negative_prompt: None,
        }
    }
}

impl ProviderParams {
    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns a validation error for non-positive or non-finite durations and
    /// malformed aspect ratios.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(ValidationError::new(ValidationErrorKind::InvalidParams(
                format!("duration must be positive, got {}", self.duration_secs),
            )));
        }
        let valid_ratio = self
            .aspect_ratio
            .split_once(':')
            .map(|(w, h)| {
                matches!((w.parse::<u32>(), h.parse::<u32>()), (Ok(w), Ok(h)) if w > 0 && h > 0)
            })
            .unwrap_or(false);
        if !valid_ratio {
            return Err(ValidationError::new(ValidationErrorKind::InvalidParams(
                format!("aspect ratio must look like W:H, got '{}'", self.aspect_ratio),
            )));
        }
        Ok(())
    }
}

/// Deterministic identity of a generation request.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("{}", _0)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint from its inputs.
    ///
    /// Each field is length-prefixed so that shifting text between fields
    /// cannot produce a collision.
    pub fn compute(
        prompt: &str,
        provider: &str,
        params: &ProviderParams,
        seed_hash: Option<&str>,
    ) -> Self {
        let params_json = serde_json::to_string(params).unwrap_or_default();
        let normalized = normalize_prompt(prompt);
        let mut hasher = Sha256::new();
        for part in [
            normalized.as_str(),
            provider,
            params_json.as_str(),
            seed_hash.unwrap_or(""),
        ] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap an existing hex digest, e.g. one typed on the command line.
    pub fn from_hex(hex: impl Into<String>) -> Option<Self> {
        let hex = hex.into();
        if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self(hex.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Collapse whitespace runs and trim, the form hashed into fingerprints.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Immutable description of one generation.
///
/// # Examples
///
/// ```
/// use lumiere_core::{GenerationRequest, ProviderParams};
///
/// let a = GenerationRequest::new("A  red kite", "sim", ProviderParams::default(), None);
/// let b = GenerationRequest::new("A red kite ", "sim", ProviderParams::default(), None);
/// assert_eq!(a.fingerprint(), b.fingerprint());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct GenerationRequest {
    /// Cache identity
    fingerprint: Fingerprint,
    /// Prompt text as submitted
    prompt: String,
    /// Provider the fingerprint was computed for
    provider: String,
    /// Quality parameters
    provider_params: ProviderParams,
    /// Frame seeding this request
    seed_anchor_ref: Option<AssetRef>,
}

impl GenerationRequest {
    /// Build a request and compute its fingerprint.
    pub fn new(
        prompt: impl Into<String>,
        provider: impl Into<String>,
        provider_params: ProviderParams,
        seed_anchor_ref: Option<AssetRef>,
    ) -> Self {
        let prompt = prompt.into();
        let provider = provider.into();
        let fingerprint = Fingerprint::compute(
            &prompt,
            &provider,
            &provider_params,
            seed_anchor_ref.as_ref().map(|r| r.content_hash.as_str()),
        );
        Self {
            fingerprint,
            prompt,
            provider,
            provider_params,
            seed_anchor_ref,
        }
    }

    /// Credits this request is expected to cost.
    pub fn estimate_cost(&self) -> CostEstimate {
        CostEstimate::calculate(
            *self.provider_params.quality(),
            *self.provider_params.duration_secs(),
        )
    }
}

/// Estimated price of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct CostEstimate {
    /// Credits to reserve
    credits: u64,
    /// Tier used for pricing
    quality: QualityTier,
    /// Duration used for pricing
    duration_secs: f64,
}

impl CostEstimate {
    /// Price a clip: `ceil(minutes * rate)`, never less than one credit.
    pub fn calculate(quality: QualityTier, duration_secs: f64) -> Self {
        let minutes = duration_secs.max(0.0) / 60.0;
        let credits = ((minutes * quality.credits_per_minute() as f64).ceil() as u64).max(1);
        Self {
            credits,
            quality,
            duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_rounds_up() {
        let estimate = CostEstimate::calculate(QualityTier::Pro, 5.0);
        // 5s at 30/min = 2.5 credits
        assert_eq!(*estimate.credits(), 3);
        let estimate = CostEstimate::calculate(QualityTier::Cinema, 60.0);
        assert_eq!(*estimate.credits(), 80);
    }

    #[test]
    fn test_cost_minimum_one_credit() {
        let estimate = CostEstimate::calculate(QualityTier::Basic, 0.5);
        assert_eq!(*estimate.credits(), 1);
    }

    #[test]
    fn test_fingerprint_changes_with_each_input() {
        let params = ProviderParams::default();
        let base = Fingerprint::compute("a cat", "sim", &params, None);
        assert_ne!(base, Fingerprint::compute("a dog", "sim", &params, None));
        assert_ne!(base, Fingerprint::compute("a cat", "other", &params, None));
        assert_ne!(base, Fingerprint::compute("a cat", "sim", &params, Some("abc")));
        let cinema = params.clone().with_quality(QualityTier::Cinema);
        assert_ne!(base, Fingerprint::compute("a cat", "sim", &cinema, None));
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let params = ProviderParams::default();
        let a = Fingerprint::compute("ab", "c", &params, None);
        let b = Fingerprint::compute("a", "bc", &params, None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_params_validation() {
        assert!(ProviderParams::default().validate().is_ok());
        assert!(ProviderParams::default().with_duration_secs(0.0).validate().is_err());
        assert!(
            ProviderParams::default()
                .with_aspect_ratio("wide".to_string())
                .validate()
                .is_err()
        );
    }
}
