//! Call record repository implementation
//!
//! Settlement locks the record row (`FOR UPDATE`), writes the ledger entry
//! and performs the guarded `initiated -> terminal` update inside one
//! transaction. A second delivery of the same event finds the record
//! terminal and changes nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;
use voicelink_core::{
    models::{CallKind, CallRecord, CallSettlement, CallStatus, FinalStatus, SettledCall},
    traits::CallRecordRepository,
    AppError, AppResult,
};

use super::user_repo::apply_entry;

const RECORD_COLUMNS: &str = "id, user_id, destination_number, kind, provider_call_id, status, \
     end_reason, duration_seconds, cost, quoted_rate_per_minute, created_at, settled_at";

/// PostgreSQL implementation of CallRecordRepository
pub struct PgCallRecordRepository {
    pool: PgPool,
}

impl PgCallRecordRepository {
    /// Create a new call record repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRecordRepository for PgCallRecordRepository {
    #[instrument(skip(self, record), fields(call_id = %record.id, kind = %record.kind))]
    async fn create(&self, record: &CallRecord) -> AppResult<CallRecord> {
        let sql = format!(
            r#"
            INSERT INTO call_records (
                id, user_id, destination_number, kind, provider_call_id, status,
                duration_seconds, cost, quoted_rate_per_minute, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            RECORD_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRecordRow>(&sql)
            .bind(record.id)
            .bind(record.user_id)
            .bind(&record.destination_number)
            .bind(record.kind.to_string())
            .bind(&record.provider_call_id)
            .bind(record.status.to_string())
            .bind(record.duration_seconds)
            .bind(record.cost)
            .bind(record.quoted_rate_per_minute)
            .bind(record.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating call record {}: {}", record.id, e);
                AppError::Database(format!("Failed to create call record: {}", e))
            })?;

        row.try_into()
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallRecord>> {
        let sql = format!("SELECT {} FROM call_records WHERE id = $1", RECORD_COLUMNS);

        let row = sqlx::query_as::<sqlx::Postgres, CallRecordRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call record {}: {}", id, e);
                AppError::Database(format!("Failed to find call record: {}", e))
            })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_provider_call_id(
        &self,
        provider_call_id: &str,
    ) -> AppResult<Option<CallRecord>> {
        let sql = format!(
            "SELECT {} FROM call_records WHERE provider_call_id = $1",
            RECORD_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRecordRow>(&sql)
            .bind(provider_call_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    "Database error finding call by provider id {}: {}",
                    provider_call_id, e
                );
                AppError::Database(format!("Failed to find call record: {}", e))
            })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn attach_provider_call_id(
        &self,
        id: Uuid,
        provider_call_id: &str,
    ) -> AppResult<CallRecord> {
        let sql = format!(
            r#"
            UPDATE call_records
            SET provider_call_id = $2
            WHERE id = $1
                AND provider_call_id IS NULL
                AND status = 'initiated'
            RETURNING {}
            "#,
            RECORD_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRecordRow>(&sql)
            .bind(id)
            .bind(provider_call_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if super::is_unique_violation(&e) {
                    return AppError::Conflict(format!(
                        "provider call id {} already linked",
                        provider_call_id
                    ));
                }
                error!("Database error linking call record {}: {}", id, e);
                AppError::Database(format!("Failed to link call record: {}", e))
            })?;

        match row {
            Some(row) => row.try_into(),
            None => match self.find_by_id(id).await? {
                Some(_) => Err(AppError::Conflict(format!(
                    "call record {} is already linked or closed",
                    id
                ))),
                None => Err(AppError::CallRecordNotFound(id.to_string())),
            },
        }
    }

    #[instrument(skip(self))]
    async fn mark_failed(&self, id: Uuid, reason: FinalStatus) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE call_records
            SET status = 'failed',
                end_reason = $2,
                settled_at = NOW()
            WHERE id = $1 AND status = 'initiated'
            "#,
        )
        .bind(id)
        .bind(reason.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error failing call record {}: {}", id, e);
            AppError::Database(format!("Failed to update call record: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, settlement), fields(status = %settlement.status, cost = %settlement.cost))]
    async fn finalize(
        &self,
        provider_call_id: &str,
        settlement: &CallSettlement,
    ) -> AppResult<Option<SettledCall>> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let locked: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT id, status FROM call_records WHERE provider_call_id = $1 FOR UPDATE",
        )
        .bind(provider_call_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to lock call record {}: {}", provider_call_id, e);
            AppError::Transaction(format!("Failed to lock call record: {}", e))
        })?;

        let (id, status) =
            locked.ok_or_else(|| AppError::CallRecordNotFound(provider_call_id.to_string()))?;

        if CallStatus::from_str(&status).map_or(true, |s| s.is_terminal()) {
            debug!("Call {} already {}, nothing to settle", provider_call_id, status);
            return Ok(None);
        }

        let (new_balance, transaction) = match &settlement.charge {
            Some(charge) => {
                let (balance, transaction) = apply_entry(&mut *tx, charge).await?;
                (Some(balance), Some(transaction))
            }
            None => (None, None),
        };

        let sql = format!(
            r#"
            UPDATE call_records
            SET status = $2,
                end_reason = $3,
                duration_seconds = $4,
                cost = $5,
                settled_at = NOW()
            WHERE id = $1 AND status = 'initiated'
            RETURNING {}
            "#,
            RECORD_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRecordRow>(&sql)
            .bind(id)
            .bind(settlement.status.to_string())
            .bind(settlement.end_reason.to_string())
            .bind(settlement.duration_seconds)
            .bind(settlement.cost)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to settle call record {}: {}", id, e);
                AppError::Transaction(format!("Failed to settle call record: {}", e))
            })?;

        let Some(row) = row else {
            warn!("Call {} changed state while locked", provider_call_id);
            return Ok(None);
        };

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(Some(SettledCall {
            record: row.try_into()?,
            transaction,
            new_balance,
        }))
    }

    #[instrument(skip(self))]
    async fn list_by_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<CallRecord>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM call_records
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            RECORD_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, CallRecordRow>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing calls for {}: {}", user_id, e);
                AppError::Database(format!("Failed to list call records: {}", e))
            })?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRecordRow {
    id: Uuid,
    user_id: Uuid,
    destination_number: String,
    kind: String,
    provider_call_id: Option<String>,
    status: String,
    end_reason: Option<String>,
    duration_seconds: i32,
    cost: Decimal,
    quoted_rate_per_minute: Option<Decimal>,
    created_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<CallRecordRow> for CallRecord {
    type Error = AppError;

    fn try_from(row: CallRecordRow) -> Result<Self, Self::Error> {
        let kind = CallKind::from_str(&row.kind)
            .ok_or_else(|| AppError::Database(format!("Unknown call kind: {}", row.kind)))?;
        let status = CallStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Database(format!("Unknown call status: {}", row.status)))?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            destination_number: row.destination_number,
            kind,
            provider_call_id: row.provider_call_id,
            status,
            end_reason: row.end_reason.as_deref().and_then(FinalStatus::from_str),
            duration_seconds: row.duration_seconds,
            cost: row.cost,
            quoted_rate_per_minute: row.quoted_rate_per_minute,
            created_at: row.created_at,
            settled_at: row.settled_at,
        })
    }
}
