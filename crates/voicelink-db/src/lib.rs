//! VoiceLink Database Layer
//!
//! PostgreSQL access and repository implementations for the billing core:
//!
//! - Connection pool management and embedded migrations with sqlx
//! - Repositories for users and wallet transactions, call rates and call records
//! - Longest prefix matching for rate lookup
//! - Atomic ledger writes (balance update plus transaction row)
//! - An in-process store implementing the same traits

pub mod memory;
pub mod pool;
pub mod repositories;
pub mod seed;

pub use memory::MemoryStore;
pub use pool::{create_pool, run_migrations};
pub use repositories::*;
pub use seed::seed_default_rates;

// Re-export commonly used types
pub use sqlx::PgPool;
pub use voicelink_core::{AppError, AppResult};
