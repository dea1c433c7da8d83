//! Rate table service
//!
//! Longest-prefix rate lookup backed by a `RateRepository`, with positive
//! results cached per destination. Cache keys embed a generation counter
//! that every administrative write bumps, so a new rule is visible to the
//! next lookup without enumerating stale keys.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use voicelink_cache::{get_json, keys, set_json};
use voicelink_core::{
    config::BillingConfig,
    models::{call_cost, CallRate, NewCallRate},
    traits::{CacheService, RateRepository},
    AppResult,
};

/// Where an applied rate came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RateSource {
    /// A matching rule in the rate table
    Table { rate_id: i32, prefix: String },
    /// The configured fallback rate
    Default,
}

/// Per-minute rate chosen for a destination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedRate {
    pub rate_per_minute: Decimal,
    #[serde(flatten)]
    pub source: RateSource,
    pub description: Option<String>,
}

impl AppliedRate {
    fn from_rule(rate: CallRate) -> Self {
        Self {
            rate_per_minute: rate.rate_per_minute,
            source: RateSource::Table {
                rate_id: rate.id,
                prefix: rate.prefix,
            },
            description: Some(rate.description),
        }
    }

    fn fallback(rate_per_minute: Decimal) -> Self {
        Self {
            rate_per_minute,
            source: RateSource::Default,
            description: None,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self.source, RateSource::Default)
    }

    /// Charge for `duration_seconds` at this rate
    pub fn cost_for(&self, duration_seconds: i32) -> Decimal {
        call_cost(self.rate_per_minute, duration_seconds)
    }
}

pub struct RateTable {
    repo: Arc<dyn RateRepository>,
    cache: Arc<dyn CacheService>,
    cache_ttl_secs: u64,
    default_rate: Option<Decimal>,
}

impl RateTable {
    pub fn new(
        repo: Arc<dyn RateRepository>,
        cache: Arc<dyn CacheService>,
        config: &BillingConfig,
    ) -> Self {
        Self {
            repo,
            cache,
            cache_ttl_secs: config.rate_cache_ttl_secs,
            default_rate: config.default_rate_per_minute.filter(|r| *r > Decimal::ZERO),
        }
    }

    /// Current cache generation, `None` when the cache is unreachable
    async fn generation(&self) -> Option<i64> {
        match self.cache.get(&keys::rate_generation_key()).await {
            Ok(Some(raw)) => match raw.parse::<i64>() {
                Ok(generation) => Some(generation),
                Err(_) => {
                    warn!("Rate generation counter holds non-integer value: {}", raw);
                    None
                }
            },
            Ok(None) => Some(0),
            Err(e) => {
                warn!("Rate cache unavailable, bypassing: {}", e);
                None
            }
        }
    }

    /// Active rule with the longest prefix of `destination`
    #[instrument(skip(self))]
    pub async fn lookup(&self, destination: &str) -> AppResult<Option<CallRate>> {
        let normalized = CallRate::normalize_destination(destination);
        if normalized.is_empty() {
            debug!("Empty destination, no rate");
            return Ok(None);
        }

        let key = self
            .generation()
            .await
            .map(|generation| keys::rate_key(generation, normalized));

        if let Some(key) = &key {
            match get_json::<CallRate>(self.cache.as_ref(), key).await {
                Ok(Some(rate)) => {
                    debug!("Rate cache HIT for {}", normalized);
                    return Ok(Some(rate));
                }
                Ok(None) => debug!("Rate cache MISS for {}", normalized),
                Err(e) => warn!("Rate cache read failed for {}: {}", normalized, e),
            }
        }

        let rate = self.repo.find_by_destination(normalized).await?;

        if let (Some(key), Some(rate)) = (&key, &rate) {
            if let Err(e) = set_json(self.cache.as_ref(), key, rate, self.cache_ttl_secs).await {
                warn!("Failed to cache rate for {}: {}", normalized, e);
            }
        }

        Ok(rate)
    }

    /// Matched rule, else the configured default, else `None`
    pub async fn resolve(&self, destination: &str) -> AppResult<Option<AppliedRate>> {
        if let Some(rate) = self.lookup(destination).await? {
            return Ok(Some(AppliedRate::from_rule(rate)));
        }
        if CallRate::normalize_destination(destination).is_empty() {
            return Ok(None);
        }
        Ok(self.default_rate.map(AppliedRate::fallback))
    }

    #[instrument(skip(self))]
    pub async fn list_active(&self) -> AppResult<Vec<CallRate>> {
        self.repo.list_active().await
    }

    /// Insert a rule and invalidate cached lookups
    #[instrument(skip(self, rate), fields(prefix = %rate.prefix, rate_per_minute = %rate.rate_per_minute))]
    pub async fn register(&self, rate: &NewCallRate) -> AppResult<CallRate> {
        rate.check()?;
        let created = self.repo.create(rate).await?;

        match self.cache.incr(&keys::rate_generation_key()).await {
            Ok(generation) => debug!("Rate cache generation now {}", generation),
            Err(e) => warn!(
                "Failed to bump rate cache generation, cached lookups may lag up to {}s: {}",
                self.cache_ttl_secs, e
            ),
        }

        info!(rate_id = created.id, "Registered call rate {}", created.prefix);
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{billing_config, new_rate, FailingCache};
    use rust_decimal_macros::dec;
    use voicelink_cache::MemoryCache;
    use voicelink_db::MemoryStore;

    fn table(store: Arc<MemoryStore>, cache: Arc<dyn CacheService>) -> RateTable {
        RateTable::new(store, cache, &billing_config())
    }

    #[tokio::test]
    async fn test_longest_prefix_lookup() {
        let store = Arc::new(MemoryStore::new());
        let rates = table(store, Arc::new(MemoryCache::new()));
        rates.register(&new_rate("+880", dec!(0.35))).await.unwrap();

        let only_short = rates.lookup("+8801712345678").await.unwrap().unwrap();
        assert_eq!(only_short.prefix, "+880");

        rates.register(&new_rate("+8801", dec!(0.40))).await.unwrap();
        let longest = rates.lookup("+8801712345678").await.unwrap().unwrap();
        assert_eq!(longest.prefix, "+8801");
        assert_eq!(longest.rate_per_minute, dec!(0.40));
    }

    #[tokio::test]
    async fn test_register_invalidates_cached_lookup() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let rates = table(store, cache.clone());
        rates.register(&new_rate("+880", dec!(0.35))).await.unwrap();

        // Warm the cache under the current generation
        assert_eq!(
            rates.lookup("+8801712345678").await.unwrap().unwrap().prefix,
            "+880"
        );
        assert!(cache.len() >= 2);

        rates.register(&new_rate("+8801", dec!(0.40))).await.unwrap();
        assert_eq!(
            rates.lookup("+8801712345678").await.unwrap().unwrap().prefix,
            "+8801"
        );
    }

    #[tokio::test]
    async fn test_cache_faults_are_bypassed() {
        let store = Arc::new(MemoryStore::new());
        let rates = table(store, Arc::new(FailingCache));
        rates.register(&new_rate("+44", dec!(0.10))).await.unwrap();

        let rate = rates.lookup("+447700900123").await.unwrap().unwrap();
        assert_eq!(rate.prefix, "+44");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_default() {
        let store = Arc::new(MemoryStore::new());
        let rates = table(store.clone(), Arc::new(MemoryCache::new()));
        rates.register(&new_rate("+880", dec!(0.35))).await.unwrap();

        let matched = rates.resolve("+8801712345678").await.unwrap().unwrap();
        assert!(!matched.is_default());
        assert_eq!(matched.description.as_deref(), Some("Test destination"));

        let fallback = rates.resolve("+15551234567").await.unwrap().unwrap();
        assert!(fallback.is_default());
        assert_eq!(fallback.rate_per_minute, dec!(0.35));

        assert!(rates.resolve("   ").await.unwrap().is_none());

        let mut strict = billing_config();
        strict.default_rate_per_minute = None;
        let strict = RateTable::new(store.clone(), Arc::new(MemoryCache::new()), &strict);
        assert!(strict.resolve("+15551234567").await.unwrap().is_none());

        // Zero is how configuration files switch the fallback off
        let mut zero = billing_config();
        zero.default_rate_per_minute = Some(dec!(0));
        let zero = RateTable::new(store, Arc::new(MemoryCache::new()), &zero);
        assert!(zero.resolve("+15551234567").await.unwrap().is_none());
        assert!(zero.resolve("+8801712345678").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_rules() {
        let store = Arc::new(MemoryStore::new());
        let rates = table(store, Arc::new(MemoryCache::new()));

        assert!(rates.register(&new_rate("", dec!(0.35))).await.is_err());
        assert!(rates.register(&new_rate("+880", dec!(0))).await.is_err());
        assert!(rates.register(&new_rate("+880", dec!(-1))).await.is_err());
        assert!(rates.list_active().await.unwrap().is_empty());
    }

    #[test]
    fn test_applied_rate_cost() {
        let applied = AppliedRate::fallback(dec!(0.35));
        assert_eq!(applied.cost_for(90), dec!(0.53));
        assert_eq!(applied.cost_for(0), dec!(0.00));
    }
}
