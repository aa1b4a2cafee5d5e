//! Polling, retry and timeout policy.

use derive_getters::Getters;
use lumiere_error::{ValidationError, ValidationErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing policy applied to every take in a batch.
///
/// Poll intervals grow geometrically from `poll_initial_ms` by
/// `poll_multiplier` up to `poll_max_ms`. Resubmissions after a transient
/// failure wait `retry_delay_ms`, grown the same way. A take is abandoned
/// once `take_timeout_ms` has elapsed since its first submission.
///
/// # Examples
///
/// ```
/// use lumiere_orchestrator::BackoffPolicy;
/// use std::time::Duration;
///
/// let policy = BackoffPolicy::default();
/// assert_eq!(policy.poll_delay(0), Duration::from_millis(1_500));
/// assert_eq!(policy.poll_delay(1), Duration::from_millis(3_000));
/// assert_eq!(policy.poll_delay(20), Duration::from_secs(30));
/// ```
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
pub struct BackoffPolicy {
    /// First poll delay
    #[serde(default = "default_poll_initial_ms")]
    poll_initial_ms: u64,

    /// Growth factor between polls and between retries
    #[serde(default = "default_poll_multiplier")]
    poll_multiplier: f64,

    /// Ceiling on a single poll delay
    #[serde(default = "default_poll_max_ms")]
    poll_max_ms: u64,

    /// Submission attempts allowed per take, fallback included
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,

    /// Consecutive failures before switching to the fallback provider
    #[serde(default = "default_fallback_after")]
    fallback_after: u32,

    /// Delay before the first resubmission
    #[serde(default = "default_retry_delay_ms")]
    retry_delay_ms: u64,

    /// How long "not found" poll answers are tolerated for a fresh task
    #[serde(default = "default_not_found_grace_ms")]
    not_found_grace_ms: u64,

    /// Overall budget for one take, from first submission to download
    #[serde(default = "default_take_timeout_ms")]
    take_timeout_ms: u64,

    /// Ceiling on any single provider call
    #[serde(default = "default_call_timeout_ms")]
    call_timeout_ms: u64,
}

fn default_poll_initial_ms() -> u64 {
    1_500
}

fn default_poll_multiplier() -> f64 {
    2.0
}

fn default_poll_max_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_fallback_after() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_not_found_grace_ms() -> u64 {
    30_000
}

fn default_take_timeout_ms() -> u64 {
    300_000
}

fn default_call_timeout_ms() -> u64 {
    60_000
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            poll_initial_ms: default_poll_initial_ms(),
            poll_multiplier: default_poll_multiplier(),
            poll_max_ms: default_poll_max_ms(),
            max_attempts: default_max_attempts(),
            fallback_after: default_fallback_after(),
            retry_delay_ms: default_retry_delay_ms(),
            not_found_grace_ms: default_not_found_grace_ms(),
            take_timeout_ms: default_take_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl BackoffPolicy {
    /// Delay before poll number `poll` (zero based).
    pub fn poll_delay(&self, poll: u32) -> Duration {
        grow(self.poll_initial_ms, self.poll_multiplier, poll, self.poll_max_ms)
    }

    /// Delay before resubmitting after failed attempt number `attempt` (one based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        grow(
            self.retry_delay_ms,
            self.poll_multiplier,
            attempt.saturating_sub(1),
            self.poll_max_ms.max(self.retry_delay_ms),
        )
    }

    /// Grace window for "not found" poll answers.
    pub fn not_found_grace(&self) -> Duration {
        Duration::from_millis(self.not_found_grace_ms)
    }

    /// Per-take deadline.
    pub fn take_timeout(&self) -> Duration {
        Duration::from_millis(self.take_timeout_ms)
    }

    /// Per-call deadline.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Check the policy is usable.
    ///
    /// # Errors
    ///
    /// Returns a validation error when no attempt is allowed, delays would
    /// shrink, or the take deadline is zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let problem = if self.max_attempts == 0 {
            Some("max_attempts must be at least 1".to_string())
        } else if self.fallback_after == 0 {
            Some("fallback_after must be at least 1".to_string())
        } else if !self.poll_multiplier.is_finite() || self.poll_multiplier < 1.0 {
            Some(format!(
                "poll_multiplier must be >= 1, got {}",
                self.poll_multiplier
            ))
        } else if self.poll_initial_ms > self.poll_max_ms {
            Some(format!(
                "poll_initial_ms ({}) exceeds poll_max_ms ({})",
                self.poll_initial_ms, self.poll_max_ms
            ))
        } else if self.take_timeout_ms == 0 || self.call_timeout_ms == 0 {
            Some("timeouts must be positive".to_string())
        } else {
            None
        };

        match problem {
            Some(message) => Err(ValidationError::new(ValidationErrorKind::InvalidParams(
                format!("backoff: {}", message),
            ))),
            None => Ok(()),
        }
    }
}

fn grow(initial_ms: u64, multiplier: f64, steps: u32, cap_ms: u64) -> Duration {
    let factor = multiplier.powi(steps.min(64) as i32);
    let millis = (initial_ms as f64 * factor).min(cap_ms as f64);
    Duration::from_millis(millis as u64)
}
