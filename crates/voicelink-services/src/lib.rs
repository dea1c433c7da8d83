//! Business logic services for VoiceLink billing
//!
//! Services own their collaborators as trait objects so the same code runs
//! against PostgreSQL/Redis in production and the in-process store in tests.
//!
//! # Services
//!
//! - [`RateTable`] - longest-prefix rate lookup with generation-keyed caching
//! - [`BalanceLedger`] - balance reads, signed adjustments and recharges
//! - [`CallAdmissionController`] - pre-call checks and provider hand-off
//! - [`SettlementReconciler`] - idempotent post-call charging

pub mod admission;
pub mod ledger;
pub mod rating;
pub mod settlement;

#[cfg(test)]
pub(crate) mod testing;

pub use admission::{AdmissionResult, CallAdmissionController};
pub use ledger::BalanceLedger;
pub use rating::{AppliedRate, RateSource, RateTable};
pub use settlement::{SettlementOutcome, SettlementReconciler};

/// Business logic constants
pub mod constants {
    /// Decimal places accepted on a recharge amount
    pub const RECHARGE_SCALE: u32 = 2;
}
