//! Call admission
//!
//! App-to-app calls are always admitted and never touch the ledger. PSTN
//! calls must resolve a rate and the caller must be able to afford one
//! minute of it. Admission records the call but places no hold on the
//! balance.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use voicelink_core::{
    models::{CallKind, CallRecord, FinalStatus, User},
    traits::{CallRecordRepository, TelephonyProvider, UserRepository},
    AppError, AppResult,
};

use crate::rating::{AppliedRate, RateTable};

/// Outcome of a successful admission
#[derive(Debug, Clone)]
pub struct AdmissionResult {
    pub call: CallRecord,
    pub estimated_cost: Decimal,
    /// Rate quoted for PSTN calls
    pub rate: Option<AppliedRate>,
}

pub struct CallAdmissionController {
    users: Arc<dyn UserRepository>,
    calls: Arc<dyn CallRecordRepository>,
    rates: Arc<RateTable>,
    provider: Arc<dyn TelephonyProvider>,
}

impl CallAdmissionController {
    pub fn new(
        users: Arc<dyn UserRepository>,
        calls: Arc<dyn CallRecordRepository>,
        rates: Arc<RateTable>,
        provider: Arc<dyn TelephonyProvider>,
    ) -> Self {
        Self {
            users,
            calls,
            rates,
            provider,
        }
    }

    #[instrument(skip(self))]
    pub async fn admit(
        &self,
        user_id: Uuid,
        destination: &str,
        kind: CallKind,
    ) -> AppResult<AdmissionResult> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(AppError::InvalidInput(
                "destination number is required".to_string(),
            ));
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))?;

        match kind {
            CallKind::Voice | CallKind::Video => {
                let call = self
                    .calls
                    .create(&CallRecord::initiated(user.id, destination, kind, None))
                    .await?;
                info!(call_id = %call.id, "App-to-app call admitted");
                Ok(AdmissionResult {
                    call,
                    estimated_cost: Decimal::new(0, 2),
                    rate: None,
                })
            }
            CallKind::Pstn => self.admit_pstn(user, destination).await,
        }
    }

    async fn admit_pstn(&self, user: User, destination: &str) -> AppResult<AdmissionResult> {
        let rate = self.rates.resolve(destination).await?.ok_or_else(|| {
            warn!(user_id = %user.id, destination, "No rate for destination");
            AppError::RateUnavailable(destination.to_string())
        })?;

        let estimated_cost = rate.rate_per_minute;
        if !user.can_afford(estimated_cost) {
            warn!(
                user_id = %user.id,
                balance = %user.balance,
                required = %estimated_cost,
                "Call rejected: insufficient balance"
            );
            return Err(AppError::InsufficientBalance {
                required: estimated_cost.to_string(),
                available: user.balance.to_string(),
            });
        }

        let identity = user
            .billing_identity
            .as_deref()
            .map(str::trim)
            .filter(|identity| !identity.is_empty())
            .ok_or_else(|| {
                AppError::InvalidInput("user has no provisioned calling identity".to_string())
            })?;

        let record = self
            .calls
            .create(&CallRecord::initiated(
                user.id,
                destination,
                CallKind::Pstn,
                Some(rate.rate_per_minute),
            ))
            .await?;

        let linked = match self.provider.place_call(identity, destination).await {
            Ok(provider_call_id) => {
                self.calls
                    .attach_provider_call_id(record.id, &provider_call_id)
                    .await
            }
            Err(e) => Err(e),
        };

        match linked {
            Ok(call) => {
                info!(
                    call_id = %call.id,
                    provider_call_id = call.provider_call_id.as_deref().unwrap_or_default(),
                    rate_per_minute = %rate.rate_per_minute,
                    default_rate = rate.is_default(),
                    "PSTN call admitted"
                );
                Ok(AdmissionResult {
                    call,
                    estimated_cost,
                    rate: Some(rate),
                })
            }
            Err(e) => {
                error!(call_id = %record.id, "Provider hand-off failed: {}", e);
                if let Err(mark_err) = self.calls.mark_failed(record.id, FinalStatus::Failed).await {
                    error!(call_id = %record.id, "Failed to close rejected call: {}", mark_err);
                }
                Err(match e {
                    AppError::Provider(_) => e,
                    other => AppError::Provider(other.to_string()),
                })
            }
        }
    }

    /// Attach the provider's id to an app-to-app call owned by `user_id`
    #[instrument(skip(self))]
    pub async fn link_provider_call(
        &self,
        user_id: Uuid,
        record_id: Uuid,
        provider_call_id: &str,
    ) -> AppResult<CallRecord> {
        let provider_call_id = provider_call_id.trim();
        if provider_call_id.is_empty() {
            return Err(AppError::InvalidInput(
                "provider call id is required".to_string(),
            ));
        }

        let record = self
            .calls
            .find_by_id(record_id)
            .await?
            .filter(|record| record.user_id == user_id)
            .ok_or_else(|| AppError::CallRecordNotFound(record_id.to_string()))?;

        if record.kind == CallKind::Pstn {
            return Err(AppError::InvalidInput(
                "PSTN calls are linked at admission".to_string(),
            ));
        }
        if record.provider_call_id.is_some() || record.is_terminal() {
            return Err(AppError::Conflict(format!(
                "call record {} is already linked or closed",
                record_id
            )));
        }

        self.calls
            .attach_provider_call_id(record_id, provider_call_id)
            .await
    }

    /// Newest first
    pub async fn history(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<CallRecord>> {
        self.calls.list_by_user(user_id, limit).await
    }
}
