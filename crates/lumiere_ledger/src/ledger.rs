//! Credit ledger implementation.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use lumiere_error::{LedgerError, LedgerErrorKind, LumiereResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Identifier of a reservation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[display("{}", _0)]
pub struct ReservationId(Uuid);

/// State of a reservation. Moves out of `Reserved` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    /// Held against the balance
    #[display("reserved")]
    Reserved,
    /// Charged
    #[display("committed")]
    Committed,
    /// Returned to the balance
    #[display("released")]
    Released,
}

/// Provisional hold on the balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct CreditReservation {
    /// Identifier
    id: ReservationId,
    /// Amount, fixed at reservation time
    amount: u64,
    /// Current state
    state: ReservationState,
    /// When the hold was placed
    created_at: DateTime<Utc>,
}

/// Point-in-time view of the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct LedgerSnapshot {
    /// Lifetime granted credits
    granted: u64,
    /// Credits charged
    committed: u64,
    /// Credits on hold
    reserved: u64,
}

impl LedgerSnapshot {
    /// Credits that can still be reserved.
    pub fn available(&self) -> u64 {
        self.granted
            .saturating_sub(self.committed)
            .saturating_sub(self.reserved)
    }
}

/// Settled reservations kept for lookup and duplicate detection.
const DEFAULT_SETTLED_HISTORY: usize = 1024;

#[derive(Debug)]
struct LedgerState {
    granted: u64,
    committed: u64,
    reserved: u64,
    open: HashMap<ReservationId, CreditReservation>,
    settled: HashMap<ReservationId, CreditReservation>,
    settled_order: VecDeque<ReservationId>,
    settled_history: usize,
}

impl LedgerState {
    fn available(&self) -> u64 {
        self.granted - self.committed - self.reserved
    }

    fn settle(&mut self, id: ReservationId, to: ReservationState) -> Result<u64, LedgerError> {
        if let Some(settled) = self.settled.get(&id) {
            let kind = match settled.state {
                ReservationState::Released => LedgerErrorKind::AlreadyReleased(id.to_string()),
                _ => LedgerErrorKind::AlreadyCommitted(id.to_string()),
            };
            return Err(LedgerError::new(kind));
        }
        let mut reservation = self
            .open
            .remove(&id)
            .ok_or_else(|| LedgerError::new(LedgerErrorKind::UnknownReservation(id.to_string())))?;

        reservation.state = to;
        let amount = reservation.amount;
        self.reserved -= amount;
        if to == ReservationState::Committed {
            self.committed += amount;
        }
        debug_assert!(self.committed + self.reserved <= self.granted);
        self.remember(reservation);
        Ok(amount)
    }

    /// Keep `reservation` in the settled history, evicting the oldest entry.
    fn remember(&mut self, reservation: CreditReservation) {
        if self.settled_history == 0 {
            return;
        }
        while self.settled_order.len() >= self.settled_history {
            if let Some(oldest) = self.settled_order.pop_front() {
                self.settled.remove(&oldest);
            }
        }
        self.settled_order.push_back(reservation.id);
        self.settled.insert(reservation.id, reservation);
    }
}

/// Single-writer prepaid account.
///
/// Invariant: `committed + reserved <= granted` at every instant.
/// Committing or releasing a reservation twice is an error. Settled
/// reservations leave the open set at once; the most recent ones are kept in
/// a bounded history so a repeated settle reports what already happened.
/// Older ids fall out of it and are then reported as unknown.
///
/// # Examples
///
/// ```
/// use lumiere_ledger::CreditLedger;
///
/// # async fn example() -> lumiere_error::LumiereResult<()> {
/// let ledger = CreditLedger::new(100);
///
/// let hold = ledger.reserve(30).await?;
/// assert_eq!(ledger.available().await, 70);
///
/// ledger.commit(hold).await?;
/// assert_eq!(ledger.available().await, 70);
/// assert!(ledger.commit(hold).await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CreditLedger {
    account: String,
    state: Mutex<LedgerState>,
}

impl CreditLedger {
    /// Open an account with `granted` credits.
    pub fn new(granted: u64) -> Self {
        Self::with_account("default", granted)
    }

    /// Open a named account with `granted` credits.
    pub fn with_account(account: impl Into<String>, granted: u64) -> Self {
        let account = account.into();
        tracing::debug!(account = %account, granted, "Opening credit ledger");
        Self {
            account,
            state: Mutex::new(LedgerState {
                granted,
                committed: 0,
                reserved: 0,
                open: HashMap::new(),
                settled: HashMap::new(),
                settled_order: VecDeque::new(),
                settled_history: DEFAULT_SETTLED_HISTORY,
            }),
        }
    }

    /// Remember at most `capacity` settled reservations.
    pub fn with_settled_history(mut self, capacity: usize) -> Self {
        let state = self.state.get_mut();
        state.settled_history = capacity;
        while state.settled_order.len() > capacity {
            if let Some(oldest) = state.settled_order.pop_front() {
                state.settled.remove(&oldest);
            }
        }
        self
    }

    /// Account name.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Hold `amount` credits.
    ///
    /// # Errors
    ///
    /// `InsufficientBalance` when fewer than `amount` credits are available;
    /// `InvalidAmount` for zero.
    #[tracing::instrument(skip(self), fields(account = %self.account))]
    pub async fn reserve(&self, amount: u64) -> LumiereResult<ReservationId> {
        if amount == 0 {
            return Err(LedgerError::new(LedgerErrorKind::InvalidAmount(amount)).into());
        }

        let mut state = self.state.lock().await;
        let available = state.available();
        if amount > available {
            tracing::warn!(requested = amount, available, "Reservation refused");
            return Err(LedgerError::new(LedgerErrorKind::InsufficientBalance {
                requested: amount,
                available,
            })
            .into());
        }

        let id = ReservationId(Uuid::new_v4());
        state.reserved += amount;
        state.open.insert(
            id,
            CreditReservation {
                id,
                amount,
                state: ReservationState::Reserved,
                created_at: Utc::now(),
            },
        );
        tracing::debug!(reservation = %id, amount, remaining = state.available(), "Credits reserved");
        Ok(id)
    }

    /// Charge a reservation.
    ///
    /// # Errors
    ///
    /// Fails for unknown ids and for reservations already committed or released.
    #[tracing::instrument(skip(self), fields(account = %self.account))]
    pub async fn commit(&self, id: ReservationId) -> LumiereResult<u64> {
        let mut state = self.state.lock().await;
        let amount = state.settle(id, ReservationState::Committed).map_err(|e| {
            tracing::error!(error = %e, "Commit rejected");
            e
        })?;
        tracing::debug!(amount, committed = state.committed, "Reservation committed");
        Ok(amount)
    }

    /// Return a reservation to the balance.
    ///
    /// # Errors
    ///
    /// Fails for unknown ids and for reservations already committed or released.
    #[tracing::instrument(skip(self), fields(account = %self.account))]
    pub async fn release(&self, id: ReservationId) -> LumiereResult<u64> {
        let mut state = self.state.lock().await;
        let amount = state.settle(id, ReservationState::Released).map_err(|e| {
            tracing::error!(error = %e, "Release rejected");
            e
        })?;
        tracing::debug!(amount, available = state.available(), "Reservation released");
        Ok(amount)
    }

    /// Add credits to the lifetime grant.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` for zero, `Overflow` if the grant counter would wrap.
    #[tracing::instrument(skip(self), fields(account = %self.account))]
    pub async fn grant(&self, amount: u64) -> LumiereResult<LedgerSnapshot> {
        if amount == 0 {
            return Err(LedgerError::new(LedgerErrorKind::InvalidAmount(amount)).into());
        }
        let mut state = self.state.lock().await;
        state.granted = state
            .granted
            .checked_add(amount)
            .ok_or_else(|| LedgerError::new(LedgerErrorKind::Overflow(amount)))?;
        tracing::info!(amount, granted = state.granted, "Credits granted");
        Ok(LedgerSnapshot {
            granted: state.granted,
            committed: state.committed,
            reserved: state.reserved,
        })
    }

    /// Current balances.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.lock().await;
        LedgerSnapshot {
            granted: state.granted,
            committed: state.committed,
            reserved: state.reserved,
        }
    }

    /// Credits that can still be reserved.
    pub async fn available(&self) -> u64 {
        self.state.lock().await.available()
    }

    /// Look up an open or recently settled reservation.
    pub async fn reservation(&self, id: ReservationId) -> Option<CreditReservation> {
        let state = self.state.lock().await;
        state
            .open
            .get(&id)
            .or_else(|| state.settled.get(&id))
            .cloned()
    }

    /// Reservations still on hold.
    pub async fn outstanding(&self) -> Vec<CreditReservation> {
        self.state.lock().await.open.values().cloned().collect()
    }

    /// Number of reservation records held in memory, open and settled.
    pub async fn tracked(&self) -> usize {
        let state = self.state.lock().await;
        state.open.len() + state.settled.len()
    }
}
