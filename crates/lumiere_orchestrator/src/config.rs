//! Orchestrator settings.

use derive_getters::Getters;
use lumiere_error::{ValidationError, ValidationErrorKind};
use serde::{Deserialize, Serialize};

/// Batch-level settings for the orchestrator.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
#[builder(default)]
pub struct OrchestratorConfig {
    /// Takes allowed in flight at once
    #[serde(default = "default_concurrency_budget")]
    concurrency_budget: usize,

    /// Where in a clip the continuity frame is taken, 0.0 to 1.0
    #[serde(default = "default_anchor_time_fraction")]
    anchor_time_fraction: f64,

    /// Provider submissions allowed per minute; zero means unlimited
    #[serde(default)]
    submissions_per_minute: u32,
}

fn default_concurrency_budget() -> usize {
    4
}

fn default_anchor_time_fraction() -> f64 {
    1.0
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency_budget: default_concurrency_budget(),
            anchor_time_fraction: default_anchor_time_fraction(),
            submissions_per_minute: 0,
        }
    }
}

impl OrchestratorConfig {
    /// Check ranges.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero concurrency budget or an anchor
    /// fraction outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.concurrency_budget == 0 {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidConcurrency(0),
            ));
        }
        if !(0.0..=1.0).contains(&self.anchor_time_fraction) {
            return Err(ValidationError::new(ValidationErrorKind::InvalidParams(
                format!(
                    "anchor_time_fraction must be within [0, 1], got {}",
                    self.anchor_time_fraction
                ),
            )));
        }
        Ok(())
    }
}
