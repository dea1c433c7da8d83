//! Repository implementations
//!
//! Concrete implementations of the repository traits defined in
//! voicelink-core, using sqlx for PostgreSQL access.

pub mod call_record_repo;
pub mod rate_repo;
pub mod user_repo;

pub use call_record_repo::PgCallRecordRepository;
pub use rate_repo::PgRateRepository;
pub use user_repo::PgUserRepository;

/// SQLSTATE 23505
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map_or(false, |code| code == "23505")
}
