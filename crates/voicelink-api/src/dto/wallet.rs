//! Wallet DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;
use voicelink_core::models::{PaymentMethod, Transaction, TransactionType};

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

/// POST /wallet/recharge
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RechargeRequest {
    pub amount: Decimal,

    pub payment_method: PaymentMethod,

    /// Payment gateway reference
    #[validate(length(max = 100, message = "reference_id is too long"))]
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            transaction_type: tx.transaction_type,
            amount: tx.amount,
            balance_after: tx.balance_after,
            description: tx.description,
            payment_method: tx.payment_method,
            reference_id: tx.reference_id,
            created_at: tx.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RechargeResponse {
    pub balance: Decimal,
    pub transaction: TransactionResponse,
}
