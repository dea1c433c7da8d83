//! Application configuration
//!
//! Centralized configuration management using the `config` crate.
//! Values come from built-in defaults, optional `config/*` files and
//! `VOICELINK__`-prefixed environment variables, in that order.

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub telephony: TelephonyConfig,
    #[serde(default)]
    pub billing: BillingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Allowed CORS origins (comma separated, `*` for any)
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_cors_origins() -> String {
    "*".to_string()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Redis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Default TTL for cached items in seconds
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

/// Authentication configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret shared with the identity service
    pub jwt_secret: String,

    /// JWT token expiration in minutes
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_minutes: i64,
}

fn default_jwt_expiration() -> i64 {
    1440 // 24 hours
}

/// Telephony provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelephonyConfig {
    /// REST API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Provider account identifier
    #[serde(default)]
    pub account_sid: String,

    /// Provider API secret
    #[serde(default)]
    pub auth_token: String,

    /// Caller id presented on outbound PSTN legs
    #[serde(default)]
    pub caller_id: String,

    /// Public URL the provider posts call status events to
    #[serde(default)]
    pub status_callback_url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Reject status callbacks without a valid provider signature
    #[serde(default = "default_validate_signatures")]
    pub validate_callback_signatures: bool,
}

fn default_api_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_validate_signatures() -> bool {
    true
}

/// Billing-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Rate applied when no prefix matches
    ///
    /// Always set when loaded through [`AppConfig::load`]; configure `0` to
    /// reject unmatched destinations instead. `None` and non-positive values
    /// both disable the fallback.
    #[serde(default = "default_rate_per_minute")]
    pub default_rate_per_minute: Option<Decimal>,

    /// TTL for cached rate lookups in seconds
    #[serde(default = "default_rate_cache_ttl")]
    pub rate_cache_ttl_secs: u64,

    /// Default page size for history endpoints
    #[serde(default = "default_history_limit")]
    pub history_default_limit: i64,

    /// Upper bound for history page size
    #[serde(default = "default_history_max")]
    pub history_max_limit: i64,

    /// Insert the built-in rates when the rate table is empty
    #[serde(default = "default_seed_rates")]
    pub seed_default_rates: bool,
}

fn default_rate_per_minute() -> Option<Decimal> {
    Decimal::from_str("0.35").ok()
}

fn default_rate_cache_ttl() -> u64 {
    300
}

fn default_history_limit() -> i64 {
    50
}

fn default_history_max() -> i64 {
    200
}

fn default_seed_rates() -> bool {
    true
}

impl BillingConfig {
    /// Clamp a requested page size into `1..=history_max_limit`
    pub fn history_limit(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.history_default_limit)
            .clamp(1, self.history_max_limit.max(1))
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("redis.default_ttl_secs", 300)?
            .set_default("auth.jwt_expiration_minutes", 1440)?
            .set_default("telephony.api_base_url", "https://api.twilio.com")?
            .set_default("telephony.request_timeout_ms", 5000)?
            .set_default("telephony.validate_callback_signatures", true)?
            .set_default("billing.default_rate_per_minute", "0.35")?
            .set_default("billing.rate_cache_ttl_secs", 300)?
            .set_default("billing.history_default_limit", 50)?
            .set_default("billing.history_max_limit", 200)?
            .set_default("billing.seed_default_rates", true)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with VOICELINK prefix
            .add_source(
                Environment::with_prefix("VOICELINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_rate_per_minute: default_rate_per_minute(),
            rate_cache_ttl_secs: default_rate_cache_ttl(),
            history_default_limit: default_history_limit(),
            history_max_limit: default_history_max(),
            seed_default_rates: default_seed_rates(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_billing_config() {
        let config = BillingConfig::default();
        assert_eq!(config.default_rate_per_minute, Some(dec!(0.35)));
        assert_eq!(config.rate_cache_ttl_secs, 300);
        assert!(config.seed_default_rates);
    }

    #[test]
    fn test_history_limit_clamping() {
        let config = BillingConfig::default();
        assert_eq!(config.history_limit(None), 50);
        assert_eq!(config.history_limit(Some(0)), 1);
        assert_eq!(config.history_limit(Some(10_000)), 200);
    }

    #[test]
    fn test_billing_section_from_source() {
        let config = Config::builder()
            .set_default("default_rate_per_minute", "0.50")
            .and_then(|b| b.set_default("seed_default_rates", false))
            .and_then(|b| b.build())
            .expect("config builds");

        let billing: BillingConfig = config.try_deserialize().expect("billing config");
        assert_eq!(billing.default_rate_per_minute, Some(dec!(0.50)));
        assert!(!billing.seed_default_rates);
        assert_eq!(billing.history_default_limit, 50);
    }

    #[test]
    fn test_zero_default_rate_deserializes() {
        let billing: BillingConfig = Config::builder()
            .set_override("default_rate_per_minute", "0")
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .expect("billing config");
        assert_eq!(billing.default_rate_per_minute, Some(dec!(0)));
    }
}
