//! Call rate repository implementation
//!
//! PostgreSQL-backed rate table with Longest Prefix Match (LPM) lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use voicelink_core::{
    models::{CallRate, NewCallRate},
    traits::RateRepository,
    AppError, AppResult,
};

/// PostgreSQL implementation of RateRepository
pub struct PgRateRepository {
    pool: PgPool,
}

impl PgRateRepository {
    /// Create a new rate repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateRepository for PgRateRepository {
    #[instrument(skip(self))]
    async fn find_by_destination(&self, destination: &str) -> AppResult<Option<CallRate>> {
        debug!("Finding rate for destination: {}", destination);

        // Generate all possible prefixes from longest to shortest
        let prefixes = CallRate::candidate_prefixes(destination);

        if prefixes.is_empty() {
            warn!("No prefixes generated for destination: {:?}", destination);
            return Ok(None);
        }

        let result = sqlx::query_as::<sqlx::Postgres, CallRateRow>(
            r#"
            SELECT id, country_code, prefix, description, rate_per_minute, active, created_at
            FROM call_rates
            WHERE prefix = ANY($1)
                AND active
            ORDER BY
                LENGTH(prefix) DESC,
                id ASC
            LIMIT 1
            "#,
        )
        .bind(&prefixes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error finding rate for destination {}: {}",
                destination, e
            );
            AppError::Database(format!("Failed to find rate: {}", e))
        })?;

        if result.is_none() {
            debug!("No rate found for destination: {}", destination);
        }

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_active(&self) -> AppResult<Vec<CallRate>> {
        let rows = sqlx::query_as::<sqlx::Postgres, CallRateRow>(
            r#"
            SELECT id, country_code, prefix, description, rate_per_minute, active, created_at
            FROM call_rates
            WHERE active
            ORDER BY prefix, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing call rates: {}", e);
            AppError::Database(format!("Failed to fetch call rates: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, rate), fields(prefix = %rate.prefix))]
    async fn create(&self, rate: &NewCallRate) -> AppResult<CallRate> {
        debug!("Creating call rate for prefix: {}", rate.prefix);

        let row = sqlx::query_as::<sqlx::Postgres, CallRateRow>(
            r#"
            INSERT INTO call_rates (country_code, prefix, description, rate_per_minute)
            VALUES ($1, $2, $3, $4)
            RETURNING id, country_code, prefix, description, rate_per_minute, active, created_at
            "#,
        )
        .bind(&rate.country_code)
        .bind(&rate.prefix)
        .bind(&rate.description)
        .bind(rate.rate_per_minute)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating call rate: {}", e);
            AppError::Database(format!("Failed to create call rate: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM call_rates")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting call rates: {}", e);
                AppError::Database(format!("Failed to count call rates: {}", e))
            })?;

        Ok(result.0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRateRow {
    id: i32,
    country_code: String,
    prefix: String,
    description: String,
    rate_per_minute: Decimal,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<CallRateRow> for CallRate {
    fn from(row: CallRateRow) -> Self {
        Self {
            id: row.id,
            country_code: row.country_code,
            prefix: row.prefix,
            description: row.description,
            rate_per_minute: row.rate_per_minute,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_longest_prefix_lookup() {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/voicelink_billing".to_string());
        let pool = PgPool::connect(&database_url).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        let repo = PgRateRepository::new(pool);

        let prefix = format!("+99{}", chrono::Utc::now().timestamp_subsec_micros());
        let longer = format!("{}1", prefix);
        for (p, r) in [(&prefix, dec!(0.35)), (&longer, dec!(0.40))] {
            repo.create(&NewCallRate {
                country_code: "ZZ".to_string(),
                prefix: p.clone(),
                description: "Test".to_string(),
                rate_per_minute: r,
            })
            .await
            .unwrap();
        }

        let found = repo
            .find_by_destination(&format!("{}12345", longer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.prefix, longer);
        assert_eq!(found.rate_per_minute, dec!(0.40));
    }
}
