//! Domain models for VoiceLink billing

pub mod call_rate;
pub mod call_record;
pub mod transaction;
pub mod user;

pub use call_rate::{call_cost, select_longest_match, CallRate, NewCallRate, COST_SCALE};
pub use call_record::{CallKind, CallRecord, CallSettlement, CallStatus, FinalStatus, SettledCall};
pub use transaction::{NewTransaction, PaymentMethod, Transaction, TransactionType};
pub use user::{NewUser, User, UserRole};
