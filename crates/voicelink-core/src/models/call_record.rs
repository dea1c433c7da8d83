//! Call record model
//!
//! One row per call attempt. A record is created `initiated` at admission
//! and moves exactly once to `completed` or `failed`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::transaction::{NewTransaction, Transaction};

/// Kind of call being placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    /// App-to-app audio
    Voice,
    /// App-to-app video
    Video,
    /// Outbound call to the public telephone network
    Pstn,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::Voice => write!(f, "voice"),
            CallKind::Video => write!(f, "video"),
            CallKind::Pstn => write!(f, "pstn"),
        }
    }
}

impl CallKind {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "voice" => Some(CallKind::Voice),
            "video" => Some(CallKind::Video),
            "pstn" => Some(CallKind::Pstn),
            _ => None,
        }
    }

    /// Only PSTN minutes are charged against the wallet
    pub fn is_billable(&self) -> bool {
        match self {
            CallKind::Voice | CallKind::Video => false,
            CallKind::Pstn => true,
        }
    }
}

/// Lifecycle state of a call record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Initiated,
    Completed,
    Failed,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Initiated => write!(f, "initiated"),
            CallStatus::Completed => write!(f, "completed"),
            CallStatus::Failed => write!(f, "failed"),
        }
    }
}

impl CallStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "initiated" => Some(CallStatus::Initiated),
            "completed" => Some(CallStatus::Completed),
            "failed" => Some(CallStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallStatus::Initiated)
    }
}

/// Final outcome reported by the telephony provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinalStatus {
    Completed,
    Busy,
    NoAnswer,
    Failed,
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalStatus::Completed => write!(f, "completed"),
            FinalStatus::Busy => write!(f, "busy"),
            FinalStatus::NoAnswer => write!(f, "no-answer"),
            FinalStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FinalStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "completed" => Some(FinalStatus::Completed),
            "busy" => Some(FinalStatus::Busy),
            "no-answer" | "no_answer" => Some(FinalStatus::NoAnswer),
            "failed" => Some(FinalStatus::Failed),
            _ => None,
        }
    }

    /// Record status this outcome settles into
    pub fn record_status(&self) -> CallStatus {
        match self {
            FinalStatus::Completed => CallStatus::Completed,
            FinalStatus::Busy | FinalStatus::NoAnswer | FinalStatus::Failed => CallStatus::Failed,
        }
    }
}

/// Call record entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Unique identifier
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Dialed number or peer identity
    pub destination_number: String,

    /// Call kind
    pub kind: CallKind,

    /// Provider-side call id, unique when present
    pub provider_call_id: Option<String>,

    /// Lifecycle status
    pub status: CallStatus,

    /// Provider's final status, set when the record leaves `initiated`
    pub end_reason: Option<FinalStatus>,

    /// Billed duration (0 until settled)
    pub duration_seconds: i32,

    /// Final charge ("0.00" until settled)
    pub cost: Decimal,

    /// Rate resolved at admission (PSTN only)
    pub quoted_rate_per_minute: Option<Decimal>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When the record reached a terminal state
    pub settled_at: Option<DateTime<Utc>>,
}

impl CallRecord {
    /// Build a fresh `initiated` record
    pub fn initiated(
        user_id: Uuid,
        destination_number: impl Into<String>,
        kind: CallKind,
        quoted_rate_per_minute: Option<Decimal>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            destination_number: destination_number.into(),
            kind,
            provider_call_id: None,
            status: CallStatus::Initiated,
            end_reason: None,
            duration_seconds: 0,
            cost: Decimal::new(0, super::call_rate::COST_SCALE),
            quoted_rate_per_minute,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Terminal transition applied by settlement
///
/// `charge` is written in the same store transaction as the status change.
#[derive(Debug, Clone)]
pub struct CallSettlement {
    pub status: CallStatus,
    pub end_reason: FinalStatus,
    pub duration_seconds: i32,
    pub cost: Decimal,
    pub charge: Option<NewTransaction>,
}

/// Result of a successful terminal transition
#[derive(Debug, Clone)]
pub struct SettledCall {
    pub record: CallRecord,
    pub transaction: Option<Transaction>,
    pub new_balance: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_billing() {
        assert!(CallKind::Pstn.is_billable());
        assert!(!CallKind::Voice.is_billable());
        assert!(!CallKind::Video.is_billable());
        assert_eq!(CallKind::from_str("PSTN"), Some(CallKind::Pstn));
        assert_eq!(CallKind::from_str("fax"), None);
    }

    #[test]
    fn test_final_status_mapping() {
        assert_eq!(FinalStatus::Completed.record_status(), CallStatus::Completed);
        assert_eq!(FinalStatus::Busy.record_status(), CallStatus::Failed);
        assert_eq!(FinalStatus::NoAnswer.record_status(), CallStatus::Failed);
        assert_eq!(FinalStatus::from_str("no-answer"), Some(FinalStatus::NoAnswer));
        assert_eq!(FinalStatus::NoAnswer.to_string(), "no-answer");
    }

    #[test]
    fn test_initiated_record() {
        let record = CallRecord::initiated(Uuid::new_v4(), "+8801712345678", CallKind::Pstn, None);
        assert_eq!(record.status, CallStatus::Initiated);
        assert!(!record.is_terminal());
        assert_eq!(record.cost.to_string(), "0.00");
        assert_eq!(record.duration_seconds, 0);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&CallKind::Pstn).unwrap(), "\"pstn\"");
        assert_eq!(
            serde_json::to_string(&FinalStatus::NoAnswer).unwrap(),
            "\"no-answer\""
        );
    }
}
