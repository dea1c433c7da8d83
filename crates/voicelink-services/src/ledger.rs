//! Balance ledger service
//!
//! Every balance change is an appended [`Transaction`]; the stored balance
//! moves by exactly the transaction amount inside the same store write.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use voicelink_core::{
    models::{NewTransaction, PaymentMethod, Transaction, TransactionType},
    traits::UserRepository,
    AppError, AppResult,
};

use crate::constants::RECHARGE_SCALE;

pub struct BalanceLedger {
    users: Arc<dyn UserRepository>,
}

impl BalanceLedger {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    #[instrument(skip(self))]
    pub async fn get_balance(&self, user_id: Uuid) -> AppResult<Decimal> {
        self.users
            .balance(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }

    /// Apply a signed amount of the given type
    pub async fn adjust(
        &self,
        user_id: Uuid,
        amount: Decimal,
        transaction_type: TransactionType,
        description: impl Into<String>,
    ) -> AppResult<(Decimal, Transaction)> {
        self.apply(&NewTransaction {
            user_id,
            transaction_type,
            amount,
            description: description.into(),
            payment_method: None,
            reference_id: None,
        })
        .await
    }

    #[instrument(skip(self, entry), fields(user_id = %entry.user_id, amount = %entry.amount, kind = %entry.transaction_type))]
    pub async fn apply(&self, entry: &NewTransaction) -> AppResult<(Decimal, Transaction)> {
        entry.check()?;
        let (balance, transaction) = self.users.apply_transaction(entry).await?;
        info!(
            transaction_id = transaction.id,
            balance = %balance,
            "Ledger entry applied"
        );
        Ok((balance, transaction))
    }

    /// Credit a top-up made through `method`
    pub async fn recharge(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
        reference_id: Option<String>,
    ) -> AppResult<(Decimal, Transaction)> {
        if amount <= Decimal::ZERO {
            warn!(user_id = %user_id, amount = %amount, "Rejected non-positive recharge");
            return Err(AppError::InvalidInput(
                "recharge amount must be positive".to_string(),
            ));
        }
        if amount.normalize().scale() > RECHARGE_SCALE {
            return Err(AppError::InvalidInput(format!(
                "recharge amount supports at most {} decimal places",
                RECHARGE_SCALE
            )));
        }

        let reference_id = reference_id
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        self.apply(&NewTransaction::recharge(user_id, amount, method, reference_id))
            .await
    }

    /// Newest first
    #[instrument(skip(self))]
    pub async fn transactions(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Transaction>> {
        self.users.list_transactions(user_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, Harness};
    use futures::future::join_all;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_unknown_user() {
        let h = Harness::new(FakeProvider::default());
        assert!(matches!(
            h.ledger.get_balance(Uuid::new_v4()).await,
            Err(AppError::UserNotFound(_))
        ));
        assert!(matches!(
            h.ledger
                .recharge(Uuid::new_v4(), dec!(5), PaymentMethod::Nagad, None)
                .await,
            Err(AppError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recharge_appends_transaction() {
        let h = Harness::new(FakeProvider::default());
        let user = h.user_with_balance(dec!(0)).await;

        let (balance, tx) = h
            .ledger
            .recharge(user.id, dec!(100.00), PaymentMethod::Bkash, Some(" TRX-1 ".to_string()))
            .await
            .unwrap();
        assert_eq!(balance, dec!(100.00));
        assert_eq!(tx.balance_after, dec!(100.00));
        assert_eq!(tx.description, "Recharge via bKash");
        assert_eq!(tx.reference_id.as_deref(), Some("TRX-1"));
        assert_eq!(h.ledger.get_balance(user.id).await.unwrap(), dec!(100.00));
    }

    #[tokio::test]
    async fn test_recharge_validation() {
        let h = Harness::new(FakeProvider::default());
        let user = h.user_with_balance(dec!(0)).await;

        for amount in [dec!(0), dec!(-5), dec!(1.005)] {
            assert!(matches!(
                h.ledger.recharge(user.id, amount, PaymentMethod::Card, None).await,
                Err(AppError::InvalidInput(_))
            ));
        }
        // Trailing zeros are not extra precision
        assert!(h
            .ledger
            .recharge(user.id, dec!(1.500), PaymentMethod::Card, None)
            .await
            .is_ok());
        assert_eq!(h.ledger.transactions(user.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_adjust_rejects_sign_mismatch() {
        let h = Harness::new(FakeProvider::default());
        let user = h.user_with_balance(dec!(10)).await;

        assert!(h
            .ledger
            .adjust(user.id, dec!(1), TransactionType::CallDeduction, "bad")
            .await
            .is_err());
        assert!(h
            .ledger
            .adjust(user.id, dec!(0), TransactionType::Recharge, "zero")
            .await
            .is_err());

        let (balance, _) = h
            .ledger
            .adjust(user.id, dec!(-2.50), TransactionType::CallDeduction, "Call to +880")
            .await
            .unwrap();
        assert_eq!(balance, dec!(7.50));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adjustments_are_linearizable() {
        let h = Harness::new(FakeProvider::default());
        let user = h.user_with_balance(dec!(20.00)).await;
        let ledger = Arc::new(h.ledger);
        let user_id = user.id;

        let tasks = (0..40).map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    ledger
                        .recharge(user_id, dec!(1.25), PaymentMethod::Nagad, None)
                        .await
                } else {
                    ledger
                        .adjust(user_id, dec!(-0.75), TransactionType::CallDeduction, "Call")
                        .await
                }
            })
        });
        for result in join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let balance = ledger.get_balance(user.id).await.unwrap();
        assert_eq!(balance, dec!(20.00) + dec!(1.25) * dec!(20) - dec!(0.75) * dec!(20));

        let history = ledger.transactions(user.id, 100).await.unwrap();
        let sum: Decimal = history.iter().map(|t| t.amount).sum();
        assert_eq!(sum, balance);
    }
}
