//! Prepaid credit accounting.
//!
//! Credits are held with [`CreditLedger::reserve`] before any costly work,
//! then either committed when the work succeeds or released when it does
//! not. All mutations go through one lock, so concurrent reservations can
//! never overdraw the account.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod ledger;

pub use ledger::{CreditLedger, CreditReservation, LedgerSnapshot, ReservationId, ReservationState};
