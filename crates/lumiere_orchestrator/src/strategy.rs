//! Primary/fallback provider selection.

use lumiere_interface::ExternalProvider;
use std::sync::Arc;

/// Which provider an attempt goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ProviderSlot {
    /// The configured primary provider
    #[display("primary")]
    Primary,
    /// The secondary provider used after repeated failures
    #[display("fallback")]
    Fallback,
}

/// A primary provider and an optional fallback behind the same contract.
///
/// Fingerprints are always computed against the primary's identity so a
/// result produced by the fallback still satisfies later lookups.
#[derive(Clone)]
pub struct ProviderStrategy {
    primary: Arc<dyn ExternalProvider>,
    fallback: Option<Arc<dyn ExternalProvider>>,
}

impl std::fmt::Debug for ProviderStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderStrategy")
            .field("primary", &self.primary.provider_name())
            .field(
                "fallback",
                &self.fallback.as_ref().map(|p| p.provider_name().to_string()),
            )
            .finish()
    }
}

impl ProviderStrategy {
    /// Use `primary` alone.
    pub fn new(primary: Arc<dyn ExternalProvider>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    /// Add a fallback provider.
    pub fn with_fallback(mut self, fallback: Arc<dyn ExternalProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Identity used in fingerprints.
    pub fn primary_name(&self) -> &str {
        self.primary.provider_name()
    }

    /// Whether a fallback is configured.
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Provider serving `slot`; the primary when no fallback exists.
    pub fn provider(&self, slot: ProviderSlot) -> &Arc<dyn ExternalProvider> {
        match (slot, &self.fallback) {
            (ProviderSlot::Fallback, Some(fallback)) => fallback,
            _ => &self.primary,
        }
    }

    /// Slot for the next attempt.
    ///
    /// Switching is one way: once a take moves to the fallback it stays there.
    pub fn next_slot(
        &self,
        current: ProviderSlot,
        consecutive_failures: u32,
        fallback_after: u32,
    ) -> ProviderSlot {
        if current == ProviderSlot::Primary
            && self.fallback.is_some()
            && consecutive_failures >= fallback_after
        {
            ProviderSlot::Fallback
        } else {
            current
        }
    }
}
