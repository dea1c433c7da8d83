//! Provider status callback parsing
//!
//! The provider posts form-encoded fields (`CallSid`, `CallStatus`,
//! `CallDuration`, ...) every time a call changes state. Only terminal
//! statuses carry a settlement outcome.

use serde::Deserialize;
use std::fmt;
use voicelink_core::models::FinalStatus;
use voicelink_core::{AppError, AppResult};

/// Call status values reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderCallStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
}

impl fmt::Display for ProviderCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderCallStatus::Queued => "queued",
            ProviderCallStatus::Initiated => "initiated",
            ProviderCallStatus::Ringing => "ringing",
            ProviderCallStatus::InProgress => "in-progress",
            ProviderCallStatus::Completed => "completed",
            ProviderCallStatus::Busy => "busy",
            ProviderCallStatus::NoAnswer => "no-answer",
            ProviderCallStatus::Failed => "failed",
            ProviderCallStatus::Canceled => "canceled",
        };
        write!(f, "{}", s)
    }
}

impl ProviderCallStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "queued" => Some(ProviderCallStatus::Queued),
            "initiated" => Some(ProviderCallStatus::Initiated),
            "ringing" => Some(ProviderCallStatus::Ringing),
            "in-progress" => Some(ProviderCallStatus::InProgress),
            "completed" => Some(ProviderCallStatus::Completed),
            "busy" => Some(ProviderCallStatus::Busy),
            "no-answer" => Some(ProviderCallStatus::NoAnswer),
            "failed" => Some(ProviderCallStatus::Failed),
            "canceled" => Some(ProviderCallStatus::Canceled),
            _ => None,
        }
    }

    /// Settlement outcome, `None` while the call is still live
    pub fn final_status(&self) -> Option<FinalStatus> {
        match self {
            ProviderCallStatus::Queued
            | ProviderCallStatus::Initiated
            | ProviderCallStatus::Ringing
            | ProviderCallStatus::InProgress => None,
            ProviderCallStatus::Completed => Some(FinalStatus::Completed),
            ProviderCallStatus::Busy => Some(FinalStatus::Busy),
            ProviderCallStatus::NoAnswer => Some(FinalStatus::NoAnswer),
            ProviderCallStatus::Failed | ProviderCallStatus::Canceled => Some(FinalStatus::Failed),
        }
    }
}

/// Raw callback body as posted by the provider
#[derive(Debug, Clone, Deserialize)]
pub struct CallStatusForm {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,

    #[serde(rename = "CallStatus")]
    pub call_status: Option<String>,

    #[serde(rename = "CallDuration")]
    pub call_duration: Option<String>,

    #[serde(rename = "From")]
    pub from: Option<String>,

    #[serde(rename = "To")]
    pub to: Option<String>,
}

impl CallStatusForm {
    /// Pick the known fields out of raw form pairs; later duplicates win
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let field = |name: &str| {
            pairs
                .iter()
                .rev()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };
        Self {
            call_sid: field("CallSid"),
            call_status: field("CallStatus"),
            call_duration: field("CallDuration"),
            from: field("From"),
            to: field("To"),
        }
    }
}

/// Validated status callback
#[derive(Debug, Clone, PartialEq)]
pub struct CallStatusEvent {
    pub provider_call_id: String,
    pub status: ProviderCallStatus,
    /// Billed seconds; 0 when absent or unparseable
    pub duration_seconds: i32,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl CallStatusEvent {
    pub fn from_form(form: CallStatusForm) -> AppResult<Self> {
        let provider_call_id = form
            .call_sid
            .map(|sid| sid.trim().to_string())
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| AppError::InvalidInput("CallSid is required".to_string()))?;

        let raw_status = form
            .call_status
            .ok_or_else(|| AppError::InvalidInput("CallStatus is required".to_string()))?;
        let status = ProviderCallStatus::from_str(&raw_status)
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown CallStatus: {}", raw_status)))?;

        let duration_seconds = form
            .call_duration
            .as_deref()
            .and_then(|d| d.trim().parse::<u32>().ok())
            .and_then(|d| i32::try_from(d).ok())
            .unwrap_or(0);

        Ok(Self {
            provider_call_id,
            status,
            duration_seconds,
            from: form.from,
            to: form.to,
        })
    }

    pub fn final_status(&self) -> Option<FinalStatus> {
        self.status.final_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(sid: Option<&str>, status: Option<&str>, duration: Option<&str>) -> CallStatusForm {
        CallStatusForm {
            call_sid: sid.map(String::from),
            call_status: status.map(String::from),
            call_duration: duration.map(String::from),
            from: Some("client:user_1".to_string()),
            to: Some("+8801712345678".to_string()),
        }
    }

    #[test]
    fn test_completed_event() {
        let event = CallStatusEvent::from_form(form(Some("CA123"), Some("completed"), Some("90")))
            .unwrap();
        assert_eq!(event.provider_call_id, "CA123");
        assert_eq!(event.duration_seconds, 90);
        assert_eq!(event.final_status(), Some(FinalStatus::Completed));
    }

    #[test]
    fn test_missing_or_bad_duration_is_zero() {
        let event = CallStatusEvent::from_form(form(Some("CA1"), Some("busy"), None)).unwrap();
        assert_eq!(event.duration_seconds, 0);
        assert_eq!(event.final_status(), Some(FinalStatus::Busy));

        let event =
            CallStatusEvent::from_form(form(Some("CA1"), Some("failed"), Some("abc"))).unwrap();
        assert_eq!(event.duration_seconds, 0);

        let event =
            CallStatusEvent::from_form(form(Some("CA1"), Some("failed"), Some("-4"))).unwrap();
        assert_eq!(event.duration_seconds, 0);
    }

    #[test]
    fn test_live_statuses_have_no_outcome() {
        for status in ["queued", "initiated", "ringing", "in-progress"] {
            let event = CallStatusEvent::from_form(form(Some("CA1"), Some(status), None)).unwrap();
            assert!(event.final_status().is_none(), "{}", status);
        }
    }

    #[test]
    fn test_canceled_settles_as_failed() {
        let event = CallStatusEvent::from_form(form(Some("CA1"), Some("canceled"), Some("0"))).unwrap();
        assert_eq!(event.final_status(), Some(FinalStatus::Failed));
    }

    #[test]
    fn test_invalid_payloads() {
        assert!(CallStatusEvent::from_form(form(None, Some("completed"), None)).is_err());
        assert!(CallStatusEvent::from_form(form(Some("  "), Some("completed"), None)).is_err());
        assert!(CallStatusEvent::from_form(form(Some("CA1"), None, None)).is_err());
        assert!(CallStatusEvent::from_form(form(Some("CA1"), Some("exploded"), None)).is_err());
    }

    #[test]
    fn test_form_from_raw_pairs() {
        let pairs: Vec<(String, String)> = [
            ("AccountSid", "AC123"),
            ("CallSid", "CA9"),
            ("CallStatus", "ringing"),
            ("CallStatus", "completed"),
            ("CallDuration", "61"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let event = CallStatusEvent::from_form(CallStatusForm::from_pairs(&pairs)).unwrap();
        assert_eq!(event.provider_call_id, "CA9");
        assert_eq!(event.status, ProviderCallStatus::Completed);
        assert_eq!(event.duration_seconds, 61);
        assert!(event.from.is_none());
    }

    #[test]
    fn test_status_round_trip_names() {
        assert_eq!(
            ProviderCallStatus::from_str("No-Answer"),
            Some(ProviderCallStatus::NoAnswer)
        );
        assert_eq!(ProviderCallStatus::InProgress.to_string(), "in-progress");
    }
}
