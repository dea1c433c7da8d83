//! Call rate DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;
use voicelink_core::models::{CallRate, NewCallRate};
use voicelink_services::{AppliedRate, RateSource};

/// POST /call-rates
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCallRateRequest {
    #[validate(length(min = 2, max = 3, message = "country_code must be 2-3 characters"))]
    pub country_code: String,

    #[validate(length(min = 1, max = 20, message = "prefix must be 1-20 characters"))]
    pub prefix: String,

    #[validate(length(min = 1, max = 100, message = "description is required"))]
    pub description: String,

    pub rate_per_minute: Decimal,
}

impl From<CreateCallRateRequest> for NewCallRate {
    fn from(req: CreateCallRateRequest) -> Self {
        Self {
            country_code: req.country_code.trim().to_uppercase(),
            prefix: req.prefix,
            description: req.description.trim().to_string(),
            rate_per_minute: req.rate_per_minute,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CallRateResponse {
    pub id: i32,
    pub country_code: String,
    pub prefix: String,
    pub description: String,
    pub rate_per_minute: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<CallRate> for CallRateResponse {
    fn from(rate: CallRate) -> Self {
        Self {
            id: rate.id,
            country_code: rate.country_code,
            prefix: rate.prefix,
            description: rate.description,
            rate_per_minute: rate.rate_per_minute,
            created_at: rate.created_at,
        }
    }
}

/// GET /call-rates/calculate?number=
#[derive(Debug, Clone, Deserialize)]
pub struct RateQuoteQuery {
    pub number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateQuoteResponse {
    pub number: String,
    pub rate_per_minute: Decimal,
    pub prefix: Option<String>,
    pub description: Option<String>,
    pub is_default: bool,
}

impl RateQuoteResponse {
    pub fn new(number: impl Into<String>, rate: AppliedRate) -> Self {
        let is_default = rate.is_default();
        let prefix = match rate.source {
            RateSource::Table { prefix, .. } => Some(prefix),
            RateSource::Default => None,
        };
        Self {
            number: number.into(),
            rate_per_minute: rate.rate_per_minute,
            prefix,
            description: rate.description,
            is_default,
        }
    }
}
