//! Cache key builders for VoiceLink billing
//!
//! # Key Patterns
//!
//! - `rate:gen` - Rate table generation counter
//! - `rate:{generation}:{destination}` - Cached rate lookup
//!
//! # Example
//!
//! ```
//! use voicelink_cache::keys;
//!
//! assert_eq!(keys::rate_key(3, "+8801712345678"), "rate:3:+8801712345678");
//! assert_eq!(keys::rate_generation_key(), "rate:gen");
//! ```

/// Prefix for cached rate lookups
pub const RATE_KEY_PREFIX: &str = "rate";

/// Counter bumped on every rate table write
///
/// Lookups cached under an older generation become unreachable and expire.
pub fn rate_generation_key() -> String {
    format!("{}:gen", RATE_KEY_PREFIX)
}

/// Key for a cached lookup of `destination` under `generation`
pub fn rate_key(generation: i64, destination: &str) -> String {
    format!("{}:{}:{}", RATE_KEY_PREFIX, generation, destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generations_do_not_collide() {
        assert_ne!(rate_key(1, "+880"), rate_key(2, "+880"));
        assert_ne!(rate_key(1, "+880"), rate_generation_key());
    }
}
