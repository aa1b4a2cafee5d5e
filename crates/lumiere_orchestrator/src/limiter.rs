//! Submission rate limiting.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectRateLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Quota on provider submissions shared by every take in a batch.
///
/// Polls, downloads and cancels are not counted; only `submit` calls wait
/// here. Cloning shares the same quota.
#[derive(Debug, Clone)]
pub struct SubmitLimiter {
    per_minute: u32,
    limiter: Arc<DirectRateLimiter>,
}

impl SubmitLimiter {
    /// Allow `per_minute` submissions per minute; `None` when zero.
    pub fn per_minute(per_minute: u32) -> Option<Self> {
        NonZeroU32::new(per_minute).map(|n| Self {
            per_minute,
            limiter: Arc::new(GovernorRateLimiter::direct(Quota::per_minute(n))),
        })
    }

    /// Configured quota.
    pub fn quota(&self) -> u32 {
        self.per_minute
    }

    /// Wait until a submission is permitted.
    pub async fn until_ready(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_quota_disables() {
        assert!(SubmitLimiter::per_minute(0).is_none());
    }

    #[test]
    fn test_quota_exhausts() {
        let limiter = SubmitLimiter::per_minute(2).expect("Non-zero quota");
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
