//! Per-take state machine.

use lumiere_core::{TakeEvent, TakeId, TakeStatus};
use lumiere_error::{OrchestratorError, OrchestratorErrorKind};
use tokio::sync::mpsc::UnboundedSender;

/// Whether `from -> to` is a legal take transition.
///
/// `Failed` is reached after every unsuccessful attempt. From there the take
/// either tries again (`Retrying`, `FallbackProvider`), rolls back its
/// reservation (`RolledBack`), or stops. `RolledBack` always ends in `Failed`.
pub fn is_allowed(from: TakeStatus, to: TakeStatus) -> bool {
    use TakeStatus::*;
    matches!(
        (from, to),
        (Pending, CacheCheck)
            | (Pending, Failed)
            | (CacheCheck, CacheHit)
            | (CacheCheck, CacheMiss)
            | (CacheCheck, Failed)
            | (CacheHit, Committed)
            | (CacheHit, ExtractingAnchor)
            | (CacheMiss, Reserving)
            | (CacheMiss, Failed)
            | (Reserving, Submitting)
            | (Reserving, Failed)
            | (Submitting, Polling)
            | (Submitting, Failed)
            | (Polling, Succeeded)
            | (Polling, Failed)
            | (Succeeded, ExtractingAnchor)
            | (Succeeded, Committed)
            | (Succeeded, Failed)
            | (ExtractingAnchor, Committed)
            | (ExtractingAnchor, Failed)
            | (Failed, Retrying)
            | (Failed, FallbackProvider)
            | (Failed, RolledBack)
            | (Retrying, Submitting)
            | (FallbackProvider, Submitting)
            | (RolledBack, Failed)
    )
}

/// Tracks one take through its lifecycle.
///
/// Every accepted transition is recorded, logged and forwarded to the event
/// channel when one is attached.
#[derive(Debug)]
pub struct TakeMachine {
    take_id: TakeId,
    index: usize,
    status: TakeStatus,
    attempt: u32,
    history: Vec<TakeStatus>,
    events: Option<UnboundedSender<TakeEvent>>,
}

impl TakeMachine {
    /// Start a machine in `Pending`.
    pub fn new(take_id: TakeId, index: usize, events: Option<UnboundedSender<TakeEvent>>) -> Self {
        Self {
            take_id,
            index,
            status: TakeStatus::Pending,
            attempt: 0,
            history: vec![TakeStatus::Pending],
            events,
        }
    }

    /// Current state.
    pub fn status(&self) -> TakeStatus {
        self.status
    }

    /// Submission attempts started so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Every state visited, starting with `Pending`.
    pub fn history(&self) -> &[TakeStatus] {
        &self.history
    }

    /// Consume the machine, returning its history.
    pub fn into_history(self) -> Vec<TakeStatus> {
        self.history
    }

    /// Move to `to`.
    ///
    /// Entering `Submitting` starts a new attempt.
    ///
    /// # Errors
    ///
    /// Returns `IllegalTransition` when the table does not allow the move;
    /// the machine is left unchanged.
    pub fn advance(&mut self, to: TakeStatus) -> Result<(), OrchestratorError> {
        if !is_allowed(self.status, to) {
            return Err(OrchestratorError::new(
                OrchestratorErrorKind::IllegalTransition {
                    from: self.status.to_string(),
                    to: to.to_string(),
                },
            ));
        }
        if to == TakeStatus::Submitting {
            self.attempt += 1;
        }
        tracing::debug!(
            take = %self.take_id,
            index = self.index,
            from = %self.status,
            to = %to,
            attempt = self.attempt,
            "Take transition"
        );
        self.status = to;
        self.history.push(to);
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = events.send(TakeEvent {
                take_id: self.take_id,
                index: self.index,
                status: to,
                attempt: self.attempt,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TakeStatus::*;

    #[test]
    fn test_happy_path_is_legal() {
        let mut machine = TakeMachine::new(TakeId::new(), 0, None);
        for status in [
            CacheCheck,
            CacheMiss,
            Reserving,
            Submitting,
            Polling,
            Succeeded,
            ExtractingAnchor,
            Committed,
        ] {
            machine.advance(status).expect("Legal transition");
        }
        assert_eq!(machine.attempt(), 1);
        assert_eq!(machine.history().len(), 9);
    }

    #[test]
    fn test_illegal_transition_leaves_state() {
        let mut machine = TakeMachine::new(TakeId::new(), 0, None);
        let err = machine.advance(Submitting).unwrap_err();
        assert!(matches!(
            err.kind,
            OrchestratorErrorKind::IllegalTransition { .. }
        ));
        assert_eq!(machine.status(), Pending);
    }

    #[test]
    fn test_committed_is_final() {
        for to in [Pending, Failed, Retrying, Submitting] {
            assert!(!is_allowed(Committed, to));
        }
    }

    #[test]
    fn test_retry_counts_attempts() {
        let mut machine = TakeMachine::new(TakeId::new(), 3, None);
        for status in [
            CacheCheck, CacheMiss, Reserving, Submitting, Failed, Retrying, Submitting, Failed,
            FallbackProvider, Submitting,
        ] {
            machine.advance(status).expect("Legal transition");
        }
        assert_eq!(machine.attempt(), 3);
    }

    #[tokio::test]
    async fn test_events_are_forwarded() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut machine = TakeMachine::new(TakeId::new(), 1, Some(tx));
        machine.advance(CacheCheck).expect("Legal transition");
        let event = rx.recv().await.expect("Event sent");
        assert_eq!(event.status, CacheCheck);
        assert_eq!(event.index, 1);
    }
}
