//! Built-in rate table
//!
//! Inserted at startup only when the rate table is completely empty, so
//! administrative changes are never overwritten.

use rust_decimal::Decimal;
use tracing::info;
use voicelink_core::{models::NewCallRate, traits::RateRepository, AppResult};

/// Bangladesh destinations billed at 0.35 per minute
pub fn default_rates() -> Vec<NewCallRate> {
    vec![
        NewCallRate {
            country_code: "BD".to_string(),
            prefix: "+880".to_string(),
            description: "Bangladesh Mobile".to_string(),
            rate_per_minute: Decimal::new(35, 2),
        },
        NewCallRate {
            country_code: "BD".to_string(),
            prefix: "+8801".to_string(),
            description: "Bangladesh Mobile".to_string(),
            rate_per_minute: Decimal::new(35, 2),
        },
    ]
}

/// Insert [`default_rates`] if no rate exists; returns the number inserted
pub async fn seed_default_rates(repo: &dyn RateRepository) -> AppResult<usize> {
    if repo.count().await? > 0 {
        return Ok(0);
    }

    let rates = default_rates();
    for rate in &rates {
        repo.create(rate).await?;
    }

    info!("Seeded {} default call rates", rates.len());
    Ok(rates.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_seed_only_when_empty() {
        let store = MemoryStore::new();
        assert_eq!(seed_default_rates(&store).await.unwrap(), 2);
        assert_eq!(seed_default_rates(&store).await.unwrap(), 0);

        let rate = store
            .find_by_destination("+8801712345678")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rate.prefix, "+8801");
        assert_eq!(rate.rate_per_minute, dec!(0.35));
    }
}
