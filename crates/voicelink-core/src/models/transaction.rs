//! Wallet transaction model
//!
//! Append-only ledger entries. A user's balance always equals the sum of
//! the amounts of that user's transactions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{AppError, AppResult};

/// Transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Wallet top-up (positive amount)
    Recharge,
    /// Settled PSTN call charge (negative amount)
    CallDeduction,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Recharge => write!(f, "recharge"),
            TransactionType::CallDeduction => write!(f, "call_deduction"),
        }
    }
}

impl TransactionType {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "recharge" => Some(TransactionType::Recharge),
            "call_deduction" => Some(TransactionType::CallDeduction),
            _ => None,
        }
    }

    /// Whether `amount` has the sign this type requires
    pub fn accepts(&self, amount: Decimal) -> bool {
        match self {
            TransactionType::Recharge => amount > Decimal::ZERO,
            TransactionType::CallDeduction => amount < Decimal::ZERO,
        }
    }
}

/// Payment channel used for a recharge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Bkash,
    Nagad,
    Card,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Bkash => write!(f, "bkash"),
            PaymentMethod::Nagad => write!(f, "nagad"),
            PaymentMethod::Card => write!(f, "card"),
        }
    }
}

impl PaymentMethod {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bkash" => Some(PaymentMethod::Bkash),
            "nagad" => Some(PaymentMethod::Nagad),
            "card" => Some(PaymentMethod::Card),
            _ => None,
        }
    }

    /// Label used in transaction descriptions
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Bkash => "bKash",
            PaymentMethod::Nagad => "Nagad",
            PaymentMethod::Card => "Card",
        }
    }
}

/// Persisted ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    /// Signed amount: positive credits, negative debits
    pub amount: Decimal,
    /// Balance immediately after this entry was applied
    pub balance_after: Decimal,
    pub description: String,
    pub payment_method: Option<PaymentMethod>,
    /// Payment reference for recharges, call record id for deductions
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry to be applied
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub payment_method: Option<PaymentMethod>,
    pub reference_id: Option<String>,
}

impl NewTransaction {
    /// Top-up entry
    pub fn recharge(
        user_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            user_id,
            transaction_type: TransactionType::Recharge,
            amount,
            description: format!("Recharge via {}", method.label()),
            payment_method: Some(method),
            reference_id,
        }
    }

    /// Debit for a settled call; `cost` is the positive charge
    pub fn call_deduction(user_id: Uuid, cost: Decimal, destination: &str, call_id: Uuid) -> Self {
        Self {
            user_id,
            transaction_type: TransactionType::CallDeduction,
            amount: -cost,
            description: format!("Call to {}", destination),
            payment_method: None,
            reference_id: Some(call_id.to_string()),
        }
    }

    /// Reject zero amounts and amounts whose sign contradicts the type
    pub fn check(&self) -> AppResult<()> {
        if self.amount.is_zero() {
            return Err(AppError::InvalidInput("amount must be non-zero".to_string()));
        }
        if !self.transaction_type.accepts(self.amount) {
            return Err(AppError::InvalidInput(format!(
                "amount {} does not match transaction type {}",
                self.amount, self.transaction_type
            )));
        }
        Ok(())
    }
}
