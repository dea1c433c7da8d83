//! In-process store
//!
//! Implements every repository trait on top of `parking_lot` locks. Each
//! user has its own mutex guarding both the wallet and the user's call
//! records, so ledger writes and settlements for one user serialize while
//! different users proceed independently. A global index maps call ids to
//! their owner. Lock order is always index -> user, and no lock is held
//! across an `.await`.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;
use voicelink_core::{
    models::{
        select_longest_match, CallRate, CallRecord, CallSettlement, CallStatus, FinalStatus,
        NewCallRate, NewTransaction, NewUser, SettledCall, Transaction, User,
    },
    traits::{CallRecordRepository, RateRepository, UserRepository},
    AppError, AppResult,
};

struct UserAccount {
    user: User,
    transactions: Vec<Transaction>,
    calls: HashMap<Uuid, CallRecord>,
}

#[derive(Default)]
struct CallIndex {
    owners: HashMap<Uuid, Uuid>,
    by_provider: HashMap<String, Uuid>,
}

/// Thread-safe in-memory implementation of the billing repositories
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, Arc<Mutex<UserAccount>>>>,
    rates: RwLock<Vec<CallRate>>,
    calls: RwLock<CallIndex>,
    next_rate_id: AtomicI32,
    next_transaction_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn account(&self, user_id: Uuid) -> Option<Arc<Mutex<UserAccount>>> {
        self.users.read().get(&user_id).cloned()
    }

    fn owned_account(&self, user_id: Uuid) -> AppResult<Arc<Mutex<UserAccount>>> {
        self.account(user_id)
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }

    /// Owner account of call record `id`
    fn call_owner(&self, id: Uuid) -> Option<Arc<Mutex<UserAccount>>> {
        let owner = self.calls.read().owners.get(&id).copied()?;
        self.account(owner)
    }

    /// Record id and owner account for a provider call id
    fn provider_call(&self, provider_call_id: &str) -> Option<(Uuid, Arc<Mutex<UserAccount>>)> {
        let (id, owner) = {
            let calls = self.calls.read();
            let id = *calls.by_provider.get(provider_call_id)?;
            (id, *calls.owners.get(&id)?)
        };
        self.account(owner).map(|account| (id, account))
    }

    fn apply_entry(&self, entry: &NewTransaction) -> AppResult<(Decimal, Transaction)> {
        let account = self.owned_account(entry.user_id)?;
        let mut account = account.lock();
        Ok(self.append(&mut account, entry))
    }

    fn append(&self, account: &mut UserAccount, entry: &NewTransaction) -> (Decimal, Transaction) {
        let balance_after = account.user.balance + entry.amount;
        let now = Utc::now();
        let transaction = Transaction {
            id: self.next_transaction_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id: entry.user_id,
            transaction_type: entry.transaction_type,
            amount: entry.amount,
            balance_after,
            description: entry.description.clone(),
            payment_method: entry.payment_method,
            reference_id: entry.reference_id.clone(),
            created_at: now,
        };
        account.user.balance = balance_after;
        account.user.updated_at = now;
        account.transactions.push(transaction.clone());

        (balance_after, transaction)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.account(id).map(|account| account.lock().user.clone()))
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let mut users = self.users.write();
        let duplicate = users.values().any(|existing| {
            let existing = existing.lock();
            (user.phone.is_some() && existing.user.phone == user.phone)
                || (user.billing_identity.is_some()
                    && existing.user.billing_identity == user.billing_identity)
        });
        if duplicate {
            return Err(AppError::Conflict(
                "phone or billing identity already registered".to_string(),
            ));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            phone: user.phone.clone(),
            name: user.name.clone(),
            balance: Decimal::new(0, 2),
            billing_identity: user.billing_identity.clone(),
            created_at: now,
            updated_at: now,
        };
        users.insert(
            created.id,
            Arc::new(Mutex::new(UserAccount {
                user: created.clone(),
                transactions: Vec::new(),
                calls: HashMap::new(),
            })),
        );

        Ok(created)
    }

    async fn balance(&self, id: Uuid) -> AppResult<Option<Decimal>> {
        Ok(self.account(id).map(|account| account.lock().user.balance))
    }

    #[instrument(skip(self, entry), fields(user_id = %entry.user_id, amount = %entry.amount))]
    async fn apply_transaction(&self, entry: &NewTransaction) -> AppResult<(Decimal, Transaction)> {
        let (balance, transaction) = self.apply_entry(entry)?;
        debug!("Ledger entry {} applied, balance now {}", transaction.id, balance);
        Ok((balance, transaction))
    }

    async fn list_transactions(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Transaction>> {
        let Some(account) = self.account(user_id) else {
            return Ok(Vec::new());
        };
        let account = account.lock();
        Ok(account
            .transactions
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RateRepository for MemoryStore {
    async fn find_by_destination(&self, destination: &str) -> AppResult<Option<CallRate>> {
        Ok(select_longest_match(self.rates.read().iter(), destination).cloned())
    }

    async fn list_active(&self) -> AppResult<Vec<CallRate>> {
        let mut active: Vec<CallRate> = self
            .rates
            .read()
            .iter()
            .filter(|rate| rate.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.prefix.cmp(&b.prefix).then_with(|| a.id.cmp(&b.id)));
        Ok(active)
    }

    async fn create(&self, rate: &NewCallRate) -> AppResult<CallRate> {
        let created = CallRate {
            id: self.next_rate_id.fetch_add(1, Ordering::SeqCst) + 1,
            country_code: rate.country_code.clone(),
            prefix: rate.prefix.clone(),
            description: rate.description.clone(),
            rate_per_minute: rate.rate_per_minute,
            active: true,
            created_at: Utc::now(),
        };
        self.rates.write().push(created.clone());
        Ok(created)
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.rates.read().len() as i64)
    }
}

#[async_trait]
impl CallRecordRepository for MemoryStore {
    async fn create(&self, record: &CallRecord) -> AppResult<CallRecord> {
        let account = self.owned_account(record.user_id)?;
        let mut calls = self.calls.write();
        if let Some(provider_call_id) = &record.provider_call_id {
            if calls.by_provider.contains_key(provider_call_id) {
                return Err(AppError::Conflict(format!(
                    "provider call id {} already linked",
                    provider_call_id
                )));
            }
            calls.by_provider.insert(provider_call_id.clone(), record.id);
        }
        calls.owners.insert(record.id, record.user_id);
        account.lock().calls.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallRecord>> {
        Ok(self
            .call_owner(id)
            .and_then(|account| account.lock().calls.get(&id).cloned()))
    }

    async fn find_by_provider_call_id(
        &self,
        provider_call_id: &str,
    ) -> AppResult<Option<CallRecord>> {
        Ok(self
            .provider_call(provider_call_id)
            .and_then(|(id, account)| account.lock().calls.get(&id).cloned()))
    }

    async fn attach_provider_call_id(
        &self,
        id: Uuid,
        provider_call_id: &str,
    ) -> AppResult<CallRecord> {
        let mut calls = self.calls.write();
        if calls.by_provider.contains_key(provider_call_id) {
            return Err(AppError::Conflict(format!(
                "provider call id {} already linked",
                provider_call_id
            )));
        }

        let account = calls
            .owners
            .get(&id)
            .and_then(|owner| self.account(*owner))
            .ok_or_else(|| AppError::CallRecordNotFound(id.to_string()))?;
        let mut account = account.lock();
        let record = account
            .calls
            .get_mut(&id)
            .ok_or_else(|| AppError::CallRecordNotFound(id.to_string()))?;
        if record.provider_call_id.is_some() || record.is_terminal() {
            return Err(AppError::Conflict(format!(
                "call record {} is already linked or closed",
                id
            )));
        }

        record.provider_call_id = Some(provider_call_id.to_string());
        calls.by_provider.insert(provider_call_id.to_string(), id);
        Ok(record.clone())
    }

    async fn mark_failed(&self, id: Uuid, reason: FinalStatus) -> AppResult<bool> {
        let account = self
            .call_owner(id)
            .ok_or_else(|| AppError::CallRecordNotFound(id.to_string()))?;
        let mut account = account.lock();
        match account.calls.get_mut(&id) {
            Some(record) if !record.is_terminal() => {
                record.status = CallStatus::Failed;
                record.end_reason = Some(reason);
                record.settled_at = Some(Utc::now());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::CallRecordNotFound(id.to_string())),
        }
    }

    async fn finalize(
        &self,
        provider_call_id: &str,
        settlement: &CallSettlement,
    ) -> AppResult<Option<SettledCall>> {
        let (id, account) = self
            .provider_call(provider_call_id)
            .ok_or_else(|| AppError::CallRecordNotFound(provider_call_id.to_string()))?;
        let mut account = account.lock();
        let account = &mut *account;

        match account.calls.get(&id) {
            Some(record) if record.is_terminal() => return Ok(None),
            Some(_) => {}
            None => return Err(AppError::CallRecordNotFound(provider_call_id.to_string())),
        }

        // Ledger first: a failed charge leaves the record untouched.
        let (new_balance, transaction) = match &settlement.charge {
            Some(charge) if charge.user_id != account.user.id => {
                return Err(AppError::Internal(format!(
                    "charge for call {} targets another user",
                    id
                )));
            }
            Some(charge) => {
                let (balance, transaction) = self.append(account, charge);
                (Some(balance), Some(transaction))
            }
            None => (None, None),
        };

        let record = account
            .calls
            .get_mut(&id)
            .ok_or_else(|| AppError::CallRecordNotFound(provider_call_id.to_string()))?;
        record.status = settlement.status;
        record.end_reason = Some(settlement.end_reason);
        record.duration_seconds = settlement.duration_seconds;
        record.cost = settlement.cost;
        record.settled_at = Some(Utc::now());

        Ok(Some(SettledCall {
            record: record.clone(),
            transaction,
            new_balance,
        }))
    }

    async fn list_by_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<CallRecord>> {
        let Some(account) = self.account(user_id) else {
            return Ok(Vec::new());
        };
        let mut records: Vec<CallRecord> = account.lock().calls.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use voicelink_core::models::{CallKind, PaymentMethod};

    async fn funded_user(store: &MemoryStore, amount: Decimal) -> User {
        let user = UserRepository::create(
            store,
            &NewUser {
                phone: Some("+8801712345678".to_string()),
                billing_identity: Some("user_1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        store
            .apply_transaction(&NewTransaction::recharge(
                user.id,
                amount,
                PaymentMethod::Bkash,
                None,
            ))
            .await
            .unwrap();
        user
    }

    fn settlement(user_id: Uuid, call_id: Uuid, cost: Decimal) -> CallSettlement {
        CallSettlement {
            status: CallStatus::Completed,
            end_reason: FinalStatus::Completed,
            duration_seconds: 90,
            cost,
            charge: Some(NewTransaction::call_deduction(user_id, cost, "+8801712345678", call_id)),
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let store = MemoryStore::new();
        funded_user(&store, dec!(1)).await;
        let again = UserRepository::create(
            &store,
            &NewUser {
                phone: Some("+8801712345678".to_string()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_finalize_is_single_shot() {
        let store = MemoryStore::new();
        let user = funded_user(&store, dec!(10.00)).await;

        let record = CallRecord::initiated(user.id, "+8801712345678", CallKind::Pstn, Some(dec!(0.35)));
        CallRecordRepository::create(&store, &record).await.unwrap();
        store.attach_provider_call_id(record.id, "CA100").await.unwrap();

        let first = store
            .finalize("CA100", &settlement(user.id, record.id, dec!(0.53)))
            .await
            .unwrap()
            .expect("first settlement applies");
        assert_eq!(first.new_balance, Some(dec!(9.47)));
        assert_eq!(first.record.status, CallStatus::Completed);

        let second = store
            .finalize("CA100", &settlement(user.id, record.id, dec!(0.53)))
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.balance(user.id).await.unwrap(), Some(dec!(9.47)));
        assert_eq!(store.list_transactions(user.id, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_finalize_unknown_call() {
        let store = MemoryStore::new();
        let result = store
            .finalize("CA404", &settlement(Uuid::new_v4(), Uuid::new_v4(), dec!(0.10)))
            .await;
        assert!(matches!(result, Err(AppError::CallRecordNotFound(_))));
    }

    #[tokio::test]
    async fn test_provider_id_is_unique() {
        let store = MemoryStore::new();
        let user = funded_user(&store, dec!(1)).await;

        let a = CallRecord::initiated(user.id, "peer_a", CallKind::Voice, None);
        let b = CallRecord::initiated(user.id, "peer_b", CallKind::Video, None);
        CallRecordRepository::create(&store, &a).await.unwrap();
        CallRecordRepository::create(&store, &b).await.unwrap();

        store.attach_provider_call_id(a.id, "CA1").await.unwrap();
        assert!(matches!(
            store.attach_provider_call_id(b.id, "CA1").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            store.attach_provider_call_id(a.id, "CA2").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_failed_only_from_initiated() {
        let store = MemoryStore::new();
        let user = funded_user(&store, dec!(1)).await;
        let record = CallRecord::initiated(user.id, "+8801712345678", CallKind::Pstn, None);
        CallRecordRepository::create(&store, &record).await.unwrap();

        assert!(store.mark_failed(record.id, FinalStatus::Failed).await.unwrap());
        assert!(!store.mark_failed(record.id, FinalStatus::Failed).await.unwrap());
        let stored = CallRecordRepository::find_by_id(&store, record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, CallStatus::Failed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_entries_never_lose_updates() {
        let store = Arc::new(MemoryStore::new());
        let user = funded_user(&store, dec!(100.00)).await;

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let entry = if i % 2 == 0 {
                        NewTransaction::recharge(user.id, dec!(1.25), PaymentMethod::Card, None)
                    } else {
                        NewTransaction::call_deduction(user.id, dec!(0.53), "+880", Uuid::new_v4())
                    };
                    store.apply_transaction(&entry).await.unwrap();
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        // 25 * 1.25 - 25 * 0.53 = 18.00
        let balance = store.balance(user.id).await.unwrap().unwrap();
        assert_eq!(balance, dec!(118.00));

        let ledger_sum: Decimal = store
            .list_transactions(user.id, 1000)
            .await
            .unwrap()
            .iter()
            .map(|t| t.amount)
            .sum();
        assert_eq!(ledger_sum, balance);
    }

    async fn pending_call(
        store: &MemoryStore,
        identity: &str,
        provider_call_id: &str,
    ) -> (Uuid, Uuid) {
        let user = UserRepository::create(
            store,
            &NewUser {
                billing_identity: Some(identity.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        store
            .apply_transaction(&NewTransaction::recharge(
                user.id,
                dec!(10.00),
                PaymentMethod::Card,
                None,
            ))
            .await
            .unwrap();
        let record = CallRecord::initiated(user.id, "+8801712345678", CallKind::Pstn, Some(dec!(0.35)));
        CallRecordRepository::create(store, &record).await.unwrap();
        store
            .attach_provider_call_id(record.id, provider_call_id)
            .await
            .unwrap();
        (user.id, record.id)
    }

    #[test]
    fn test_settlements_for_different_users_do_not_contend() {
        use futures::executor::block_on;
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let store = Arc::new(MemoryStore::new());
        let (alice, alice_call) = block_on(pending_call(&store, "alice", "CA-A"));
        let (bob, bob_call) = block_on(pending_call(&store, "bob", "CA-B"));

        // Bob's settlement parks on his account lock
        let bob_account = store.account(bob).unwrap();
        let held = bob_account.lock();
        let parked = {
            let store = store.clone();
            thread::spawn(move || {
                block_on(store.finalize("CA-B", &settlement(bob, bob_call, dec!(0.53))))
            })
        };
        thread::sleep(Duration::from_millis(50));

        let (tx, rx) = mpsc::channel();
        {
            let store = store.clone();
            thread::spawn(move || {
                let charge = settlement(alice, alice_call, dec!(0.53));
                let result = block_on(store.finalize("CA-A", &charge));
                let _ = tx.send(result.map(|settled| settled.map(|s| s.new_balance)));
            });
        }
        let alice_balance = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("settlement for another user must not wait")
            .unwrap();
        assert_eq!(alice_balance, Some(Some(dec!(9.47))));

        drop(held);
        assert!(parked.join().unwrap().unwrap().is_some());
        assert_eq!(block_on(store.balance(bob)).unwrap(), Some(dec!(9.47)));
    }

    #[tokio::test]
    async fn test_call_for_unknown_user_rejected() {
        let store = MemoryStore::new();
        let record = CallRecord::initiated(Uuid::new_v4(), "peer", CallKind::Voice, None);
        assert!(matches!(
            CallRecordRepository::create(&store, &record).await,
            Err(AppError::UserNotFound(_))
        ));
    }
}
