//! Shared application state

use std::sync::Arc;
use voicelink_core::{
    config::BillingConfig,
    traits::{CacheService, CallRecordRepository, RateRepository, TelephonyProvider, UserRepository},
};
use voicelink_services::{BalanceLedger, CallAdmissionController, RateTable, SettlementReconciler};
use voicelink_telephony::CallbackValidator;

/// Services shared by every worker, registered as `web::Data<AppState>`
#[derive(Clone)]
pub struct AppState {
    pub rates: Arc<RateTable>,
    pub ledger: Arc<BalanceLedger>,
    pub admission: Arc<CallAdmissionController>,
    pub settlement: Arc<SettlementReconciler>,
    pub billing: BillingConfig,
    /// Signature check for provider callbacks; `None` accepts them unsigned
    pub callbacks: Option<Arc<CallbackValidator>>,
}

impl AppState {
    pub fn new(
        users: Arc<dyn UserRepository>,
        rate_repo: Arc<dyn RateRepository>,
        calls: Arc<dyn CallRecordRepository>,
        cache: Arc<dyn CacheService>,
        provider: Arc<dyn TelephonyProvider>,
        billing: BillingConfig,
    ) -> Self {
        let rates = Arc::new(RateTable::new(rate_repo, cache, &billing));
        Self {
            ledger: Arc::new(BalanceLedger::new(users.clone())),
            admission: Arc::new(CallAdmissionController::new(
                users,
                calls.clone(),
                rates.clone(),
                provider,
            )),
            settlement: Arc::new(SettlementReconciler::new(calls, rates.clone())),
            rates,
            billing,
            callbacks: None,
        }
    }

    pub fn with_callback_validator(mut self, validator: CallbackValidator) -> Self {
        self.callbacks = Some(Arc::new(validator));
        self
    }
}
