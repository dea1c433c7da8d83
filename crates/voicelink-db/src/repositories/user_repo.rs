//! User and wallet ledger repository
//!
//! Balance changes are a single `UPDATE ... SET balance = balance + $n`
//! executed in the same transaction as the ledger insert, so concurrent
//! writers for one user serialize on the row lock and never lose updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, error, instrument};
use uuid::Uuid;
use voicelink_core::{
    models::{NewTransaction, NewUser, PaymentMethod, Transaction, TransactionType, User},
    traits::UserRepository,
    AppError, AppResult,
};

/// PostgreSQL implementation of UserRepository
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Apply a ledger entry on an open connection or transaction
///
/// Callers own the surrounding transaction; nothing is committed here.
pub(crate) async fn apply_entry(
    conn: &mut PgConnection,
    entry: &NewTransaction,
) -> AppResult<(Decimal, Transaction)> {
    let updated: Option<(Decimal,)> = sqlx::query_as(
        r#"
        UPDATE users
        SET balance = balance + $2,
            updated_at = NOW()
        WHERE id = $1
        RETURNING balance
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.amount)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        error!("Failed to update balance for user {}: {}", entry.user_id, e);
        AppError::Transaction(format!("Failed to update balance: {}", e))
    })?;

    let (balance_after,) =
        updated.ok_or_else(|| AppError::UserNotFound(entry.user_id.to_string()))?;

    let row = sqlx::query_as::<sqlx::Postgres, TransactionRow>(
        r#"
        INSERT INTO transactions (
            user_id, transaction_type, amount, balance_after,
            description, payment_method, reference_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING
            id, user_id, transaction_type, amount, balance_after,
            description, payment_method, reference_id, created_at
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.transaction_type.to_string())
    .bind(entry.amount)
    .bind(balance_after)
    .bind(&entry.description)
    .bind(entry.payment_method.map(|m| m.to_string()))
    .bind(&entry.reference_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        error!("Failed to insert transaction for user {}: {}", entry.user_id, e);
        AppError::Transaction(format!("Failed to record transaction: {}", e))
    })?;

    Ok((balance_after, row.try_into()?))
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        debug!("Finding user by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, UserRow>(
            r#"
            SELECT id, phone, name, balance, billing_identity, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding user {}: {}", id, e);
            AppError::Database(format!("Failed to find user: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, user))]
    async fn create(&self, user: &NewUser) -> AppResult<User> {
        debug!("Creating user with phone {:?}", user.phone);

        let row = sqlx::query_as::<sqlx::Postgres, UserRow>(
            r#"
            INSERT INTO users (id, phone, name, billing_identity)
            VALUES ($1, $2, $3, $4)
            RETURNING id, phone, name, balance, billing_identity, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.phone)
        .bind(&user.name)
        .bind(&user.billing_identity)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if super::is_unique_violation(&e) {
                return AppError::Conflict("phone or billing identity already registered".into());
            }
            error!("Database error creating user: {}", e);
            AppError::Database(format!("Failed to create user: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn balance(&self, id: Uuid) -> AppResult<Option<Decimal>> {
        let result: Option<(Decimal,)> = sqlx::query_as("SELECT balance FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error reading balance for {}: {}", id, e);
                AppError::Database(format!("Failed to read balance: {}", e))
            })?;

        Ok(result.map(|(balance,)| balance))
    }

    #[instrument(skip(self, entry), fields(user_id = %entry.user_id, amount = %entry.amount))]
    async fn apply_transaction(&self, entry: &NewTransaction) -> AppResult<(Decimal, Transaction)> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let (balance, transaction) = apply_entry(&mut *tx, entry).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        debug!("Ledger entry {} applied, balance now {}", transaction.id, balance);
        Ok((balance, transaction))
    }

    #[instrument(skip(self))]
    async fn list_transactions(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<sqlx::Postgres, TransactionRow>(
            r#"
            SELECT
                id, user_id, transaction_type, amount, balance_after,
                description, payment_method, reference_id, created_at
            FROM transactions
            WHERE user_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing transactions for {}: {}", user_id, e);
            AppError::Database(format!("Failed to list transactions: {}", e))
        })?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    phone: Option<String>,
    name: Option<String>,
    balance: Decimal,
    billing_identity: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            phone: row.phone,
            name: row.name,
            balance: row.balance,
            billing_identity: row.billing_identity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    user_id: Uuid,
    transaction_type: String,
    amount: Decimal,
    balance_after: Decimal,
    description: String,
    payment_method: Option<String>,
    reference_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let transaction_type = TransactionType::from_str(&row.transaction_type).ok_or_else(|| {
            AppError::Database(format!("Unknown transaction type: {}", row.transaction_type))
        })?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            transaction_type,
            amount: row.amount,
            balance_after: row.balance_after,
            description: row.description,
            payment_method: row.payment_method.as_deref().and_then(PaymentMethod::from_str),
            reference_id: row.reference_id,
            created_at: row.created_at,
        })
    }
}
