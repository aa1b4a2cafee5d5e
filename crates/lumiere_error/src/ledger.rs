//! Credit ledger error types.

/// Kinds of ledger failures.
///
/// `InsufficientBalance` is the budget error surfaced before any provider call.
/// The remaining variants indicate programming errors in reservation handling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum LedgerErrorKind {
    /// Not enough unreserved balance for the requested amount
    #[display("Insufficient balance: requested {}, available {}", requested, available)]
    InsufficientBalance {
        /// Amount requested
        requested: u64,
        /// Amount available at the time of the request
        available: u64,
    },
    /// Reservation amounts must be positive
    #[display("Invalid amount: {}", _0)]
    InvalidAmount(u64),
    /// No reservation exists with this id
    #[display("Unknown reservation: {}", _0)]
    UnknownReservation(String),
    /// Reservation was already committed
    #[display("Reservation {} already committed", _0)]
    AlreadyCommitted(String),
    /// Reservation was already released
    #[display("Reservation {} already released", _0)]
    AlreadyReleased(String),
    /// Granting would overflow the balance counter
    #[display("Grant of {} would overflow the ledger", _0)]
    Overflow(u64),
}

/// Ledger error with location tracking.
///
/// # Examples
///
/// ```
/// use lumiere_error::{LedgerError, LedgerErrorKind};
///
/// let err = LedgerError::new(LedgerErrorKind::InsufficientBalance {
///     requested: 10,
///     available: 5,
/// });
/// assert!(err.is_budget());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Ledger Error: {} at line {} in {}", kind, line, file)]
pub struct LedgerError {
    /// The kind of error that occurred
    pub kind: LedgerErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl LedgerError {
    /// Create a new ledger error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: LedgerErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// True when the failure is an ordinary lack of funds.
    pub fn is_budget(&self) -> bool {
        matches!(self.kind, LedgerErrorKind::InsufficientBalance { .. })
    }
}
