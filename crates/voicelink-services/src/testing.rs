//! Shared fixtures for service tests

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;
use voicelink_cache::MemoryCache;
use voicelink_core::{
    config::BillingConfig,
    models::{NewCallRate, NewTransaction, NewUser, PaymentMethod, User},
    traits::{CacheService, TelephonyProvider, UserRepository},
    AppError, AppResult,
};
use voicelink_db::MemoryStore;

use crate::{BalanceLedger, CallAdmissionController, RateTable, SettlementReconciler};

pub fn billing_config() -> BillingConfig {
    BillingConfig::default()
}

pub fn new_rate(prefix: &str, rate_per_minute: Decimal) -> NewCallRate {
    NewCallRate {
        country_code: "BD".to_string(),
        prefix: prefix.to_string(),
        description: "Test destination".to_string(),
        rate_per_minute,
    }
}

/// Cache whose every operation fails
pub struct FailingCache;

#[async_trait]
impl CacheService for FailingCache {
    async fn get(&self, _key: &str) -> AppResult<Option<String>> {
        Err(AppError::CacheConnection("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> AppResult<()> {
        Err(AppError::CacheConnection("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> AppResult<bool> {
        Err(AppError::CacheConnection("connection refused".to_string()))
    }

    async fn incr(&self, _key: &str) -> AppResult<i64> {
        Err(AppError::CacheConnection("connection refused".to_string()))
    }
}

/// Provider that hands out sequential call ids, or refuses every call
#[derive(Default)]
pub struct FakeProvider {
    pub refuse: bool,
    pub placed: AtomicU32,
}

impl FakeProvider {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    pub fn placed(&self) -> u32 {
        self.placed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelephonyProvider for FakeProvider {
    async fn place_call(&self, billing_identity: &str, _destination: &str) -> AppResult<String> {
        if self.refuse {
            return Err(AppError::Provider("destination unreachable".to_string()));
        }
        let n = self.placed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("CA-{}-{}", billing_identity, n))
    }
}

/// Services wired to one in-memory store
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub rates: Arc<RateTable>,
    pub ledger: BalanceLedger,
    pub admission: CallAdmissionController,
    pub settlement: SettlementReconciler,
    pub provider: Arc<FakeProvider>,
}

impl Harness {
    pub fn new(provider: FakeProvider) -> Self {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(provider);
        let rates = Arc::new(RateTable::new(
            store.clone(),
            Arc::new(MemoryCache::new()),
            &billing_config(),
        ));
        Self {
            ledger: BalanceLedger::new(store.clone()),
            admission: CallAdmissionController::new(
                store.clone(),
                store.clone(),
                rates.clone(),
                provider.clone(),
            ),
            settlement: SettlementReconciler::new(store.clone(), rates.clone()),
            store,
            rates,
            provider,
        }
    }

    pub async fn user_with_balance(&self, balance: Decimal) -> User {
        let identity = format!("user_{}", Uuid::new_v4().simple());
        let user = UserRepository::create(
            self.store.as_ref(),
            &NewUser {
                billing_identity: Some(identity),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        if !balance.is_zero() {
            self.store
                .apply_transaction(&NewTransaction::recharge(
                    user.id,
                    balance,
                    PaymentMethod::Card,
                    None,
                ))
                .await
                .unwrap();
        }
        user
    }
}
