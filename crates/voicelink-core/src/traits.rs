//! Common traits for repositories and collaborators
//!
//! Services depend on these abstractions through `Arc<dyn Trait>` so the
//! PostgreSQL store, the in-process store and test doubles are
//! interchangeable.

use crate::error::AppError;
use crate::models::{
    CallRate, CallRecord, CallSettlement, FinalStatus, NewCallRate, NewTransaction, NewUser,
    SettledCall, Transaction, User,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

/// User and wallet storage
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find user by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Create a user with a zero balance
    async fn create(&self, user: &NewUser) -> Result<User, AppError>;

    /// Current balance, `None` if the user does not exist
    async fn balance(&self, id: Uuid) -> Result<Option<Decimal>, AppError>;

    /// Append a ledger entry and move the balance by the same amount, atomically
    ///
    /// Fails with `UserNotFound` if the user does not exist.
    async fn apply_transaction(
        &self,
        entry: &NewTransaction,
    ) -> Result<(Decimal, Transaction), AppError>;

    /// Ledger entries for a user, newest first
    async fn list_transactions(&self, user_id: Uuid, limit: i64)
        -> Result<Vec<Transaction>, AppError>;
}

/// Rate table storage
#[async_trait]
pub trait RateRepository: Send + Sync {
    /// Find rate by destination using Longest Prefix Match
    async fn find_by_destination(&self, destination: &str) -> Result<Option<CallRate>, AppError>;

    /// All active rules ordered by prefix
    async fn list_active(&self) -> Result<Vec<CallRate>, AppError>;

    /// Insert a new rule
    async fn create(&self, rate: &NewCallRate) -> Result<CallRate, AppError>;

    /// Count all rules, active or not
    async fn count(&self) -> Result<i64, AppError>;
}

/// Call record storage
#[async_trait]
pub trait CallRecordRepository: Send + Sync {
    /// Persist a freshly admitted record
    async fn create(&self, record: &CallRecord) -> Result<CallRecord, AppError>;

    /// Find record by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CallRecord>, AppError>;

    /// Point lookup by provider call id
    async fn find_by_provider_call_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Option<CallRecord>, AppError>;

    /// Attach the provider's call id to an `initiated` record
    ///
    /// Fails with `Conflict` if the record already has one, is terminal, or
    /// the id belongs to another record.
    async fn attach_provider_call_id(
        &self,
        id: Uuid,
        provider_call_id: &str,
    ) -> Result<CallRecord, AppError>;

    /// Move an `initiated` record to `failed`; false if it was already terminal
    async fn mark_failed(&self, id: Uuid, reason: FinalStatus) -> Result<bool, AppError>;

    /// Apply the terminal transition and its ledger entry in one atomic step
    ///
    /// Returns `None` when the record is no longer `initiated`.
    async fn finalize(
        &self,
        provider_call_id: &str,
        settlement: &CallSettlement,
    ) -> Result<Option<SettledCall>, AppError>;

    /// Records for a user, newest first
    async fn list_by_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<CallRecord>, AppError>;
}

/// Key/value cache
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get raw value from cache
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Set raw value with TTL
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError>;

    /// Delete value from cache
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Atomically increment a counter, creating it at 1
    async fn incr(&self, key: &str) -> Result<i64, AppError>;
}

/// Outbound side of the telephony provider
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    /// Bridge the user's client identity to `destination`, returning the provider call id
    async fn place_call(&self, billing_identity: &str, destination: &str)
        -> Result<String, AppError>;
}
