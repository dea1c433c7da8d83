//! VoiceLink Core Library
//!
//! Foundational types shared by every VoiceLink billing crate:
//!
//! - Domain models (User, CallRate, CallRecord, Transaction)
//! - Repository, cache and telephony traits
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
