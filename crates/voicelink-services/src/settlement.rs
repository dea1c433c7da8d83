//! Settlement reconciler
//!
//! Turns a provider completion event into the final charge for a call.
//! The ledger entry and the terminal status change are committed together
//! by the repository, guarded on the record still being `initiated`, so a
//! redelivered or concurrent event never charges twice.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use voicelink_core::{
    models::{
        call_cost, CallKind, CallRecord, CallSettlement, FinalStatus, NewTransaction, SettledCall,
    },
    traits::CallRecordRepository,
    AppError, AppResult,
};

use crate::rating::RateTable;

#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Settled(SettledCall),
    /// The record was already terminal; nothing changed
    AlreadySettled,
}

impl SettlementOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, SettlementOutcome::AlreadySettled)
    }
}

pub struct SettlementReconciler {
    calls: Arc<dyn CallRecordRepository>,
    rates: Arc<RateTable>,
}

impl SettlementReconciler {
    pub fn new(calls: Arc<dyn CallRecordRepository>, rates: Arc<RateTable>) -> Self {
        Self { calls, rates }
    }

    #[instrument(skip(self))]
    pub async fn settle(
        &self,
        provider_call_id: &str,
        final_status: FinalStatus,
        duration_seconds: i32,
    ) -> AppResult<SettlementOutcome> {
        if duration_seconds < 0 {
            return Err(AppError::InvalidInput(format!(
                "duration must not be negative: {}",
                duration_seconds
            )));
        }

        let record = self
            .calls
            .find_by_provider_call_id(provider_call_id)
            .await?
            .ok_or_else(|| {
                warn!("Completion event for unknown call");
                AppError::CallRecordNotFound(provider_call_id.to_string())
            })?;

        if record.is_terminal() {
            info!(call_id = %record.id, status = %record.status, "Call already settled");
            return Ok(SettlementOutcome::AlreadySettled);
        }

        let cost = self.final_cost(&record, duration_seconds).await?;
        let charge = (cost > Decimal::ZERO).then(|| {
            NewTransaction::call_deduction(record.user_id, cost, &record.destination_number, record.id)
        });
        let settlement = CallSettlement {
            status: final_status.record_status(),
            end_reason: final_status,
            duration_seconds,
            cost,
            charge,
        };

        match self.calls.finalize(provider_call_id, &settlement).await {
            Ok(Some(settled)) => {
                info!(
                    call_id = %settled.record.id,
                    status = %settled.record.status,
                    duration_seconds,
                    cost = %cost,
                    new_balance = ?settled.new_balance,
                    "Call settled"
                );
                Ok(SettlementOutcome::Settled(settled))
            }
            Ok(None) => {
                info!(call_id = %record.id, "Lost settlement race, already settled");
                Ok(SettlementOutcome::AlreadySettled)
            }
            Err(e) => {
                error!(call_id = %record.id, "Settlement failed: {}", e);
                Err(e)
            }
        }
    }

    async fn final_cost(&self, record: &CallRecord, duration_seconds: i32) -> AppResult<Decimal> {
        match record.kind {
            CallKind::Voice | CallKind::Video => Ok(Decimal::new(0, 2)),
            CallKind::Pstn if duration_seconds == 0 => Ok(Decimal::new(0, 2)),
            CallKind::Pstn => match self.rates.resolve(&record.destination_number).await? {
                Some(rate) => Ok(rate.cost_for(duration_seconds)),
                None => {
                    let quoted = record.quoted_rate_per_minute.ok_or_else(|| {
                        error!(call_id = %record.id, "No rate to settle call with");
                        AppError::RateUnavailable(record.destination_number.clone())
                    })?;
                    warn!(call_id = %record.id, "Settling at the rate quoted on admission");
                    Ok(call_cost(quoted, duration_seconds))
                }
            },
        }
    }
}
