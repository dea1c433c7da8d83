//! Call DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use voicelink_core::models::{CallKind, CallRecord, CallStatus, FinalStatus};
use voicelink_services::{AdmissionResult, RateSource};

/// POST /calls/initiate
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InitiateCallRequest {
    /// E.164 number for PSTN calls, peer identity for app-to-app calls
    #[validate(length(min = 1, max = 64, message = "destination_number is required"))]
    pub destination_number: String,

    #[serde(default = "default_kind")]
    pub kind: CallKind,
}

fn default_kind() -> CallKind {
    CallKind::Pstn
}

/// POST /calls/{id}/link
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LinkCallRequest {
    #[validate(length(min = 1, max = 64, message = "provider_call_id is required"))]
    pub provider_call_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallRecordResponse {
    pub id: Uuid,
    pub destination_number: String,
    pub kind: CallKind,
    pub provider_call_id: Option<String>,
    pub status: CallStatus,
    pub end_reason: Option<FinalStatus>,
    pub duration_seconds: i32,
    pub cost: Decimal,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl From<CallRecord> for CallRecordResponse {
    fn from(record: CallRecord) -> Self {
        Self {
            id: record.id,
            destination_number: record.destination_number,
            kind: record.kind,
            provider_call_id: record.provider_call_id,
            status: record.status,
            end_reason: record.end_reason,
            duration_seconds: record.duration_seconds,
            cost: record.cost,
            created_at: record.created_at,
            settled_at: record.settled_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiateCallResponse {
    pub call: CallRecordResponse,
    pub estimated_cost: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_per_minute: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_prefix: Option<String>,
}

impl From<AdmissionResult> for InitiateCallResponse {
    fn from(result: AdmissionResult) -> Self {
        let (rate_per_minute, rate_prefix) = match result.rate {
            Some(rate) => {
                let prefix = match rate.source {
                    RateSource::Table { prefix, .. } => Some(prefix),
                    RateSource::Default => None,
                };
                (Some(rate.rate_per_minute), prefix)
            }
            None => (None, None),
        };
        Self {
            call: result.call.into(),
            estimated_cost: result.estimated_cost,
            rate_per_minute,
            rate_prefix,
        }
    }
}
