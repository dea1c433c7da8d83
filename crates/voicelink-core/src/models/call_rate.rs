//! Call rate model
//!
//! Per-minute billing rules keyed by destination prefix. Lookup selects the
//! active rule with the longest prefix that literally starts the dialed
//! number.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Decimal places of a settled call charge
pub const COST_SCALE: u32 = 2;

/// Call rate entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRate {
    /// Unique identifier, assigned on insert
    pub id: i32,

    /// ISO country code (e.g. "BD")
    pub country_code: String,

    /// Destination prefix matched against the left side of the number (e.g. "+8801")
    pub prefix: String,

    /// Human-readable destination name
    pub description: String,

    /// Rate per minute
    pub rate_per_minute: Decimal,

    /// Inactive rules never match
    pub active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl CallRate {
    /// Whether this rule is eligible for `destination`
    #[inline]
    pub fn matches(&self, destination: &str) -> bool {
        self.active && !self.prefix.is_empty() && destination.starts_with(self.prefix.as_str())
    }

    /// Normalize a dialed number for lookup
    ///
    /// Only surrounding whitespace is removed: prefixes carry the leading `+`
    /// and are compared literally.
    pub fn normalize_destination(destination: &str) -> &str {
        destination.trim()
    }

    /// Generate all leading substrings of a destination (for LPM lookup)
    ///
    /// Returns prefixes from longest to shortest, split on char boundaries.
    pub fn candidate_prefixes(destination: &str) -> Vec<String> {
        let normalized = Self::normalize_destination(destination);
        let mut prefixes: Vec<String> = normalized
            .char_indices()
            .skip(1)
            .map(|(idx, _)| normalized[..idx].to_string())
            .collect();
        if !normalized.is_empty() {
            prefixes.push(normalized.to_string());
        }
        prefixes.reverse();
        prefixes
    }
}

impl Default for CallRate {
    fn default() -> Self {
        Self {
            id: 0,
            country_code: String::new(),
            prefix: String::new(),
            description: String::new(),
            rate_per_minute: Decimal::ZERO,
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// Pick the rule that bills `destination`
///
/// Longest matching prefix wins; among identical prefixes the lowest id wins.
pub fn select_longest_match<'a, I>(rates: I, destination: &str) -> Option<&'a CallRate>
where
    I: IntoIterator<Item = &'a CallRate>,
{
    let destination = CallRate::normalize_destination(destination);
    if destination.is_empty() {
        return None;
    }

    rates
        .into_iter()
        .filter(|rate| rate.matches(destination))
        .min_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.id.cmp(&b.id))
        })
}

/// `rate_per_minute * seconds / 60`, rounded half away from zero to cents
pub fn call_cost(rate_per_minute: Decimal, duration_seconds: i32) -> Decimal {
    if duration_seconds <= 0 {
        return Decimal::new(0, COST_SCALE);
    }

    let mut cost = (rate_per_minute * Decimal::from(duration_seconds) / Decimal::from(60))
        .round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero);
    cost.rescale(COST_SCALE);
    cost
}

/// Administrative registration payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewCallRate {
    #[validate(length(min = 2, max = 3, message = "country code must be 2-3 characters"))]
    pub country_code: String,

    #[validate(length(min = 1, max = 20, message = "prefix must be 1-20 characters"))]
    pub prefix: String,

    #[validate(length(min = 1, max = 100, message = "description is required"))]
    pub description: String,

    pub rate_per_minute: Decimal,
}

impl NewCallRate {
    /// Validate field lengths plus the positive-rate rule
    pub fn check(&self) -> crate::AppResult<()> {
        self.validate()?;
        if self.prefix.trim() != self.prefix {
            return Err(crate::AppError::Validation(
                "prefix must not contain surrounding whitespace".to_string(),
            ));
        }
        if self.rate_per_minute <= Decimal::ZERO {
            return Err(crate::AppError::Validation(
                "rate_per_minute must be positive".to_string(),
            ));
        }
        if self.rate_per_minute.scale() > 4 {
            return Err(crate::AppError::Validation(
                "rate_per_minute supports at most 4 decimal places".to_string(),
            ));
        }
        Ok(())
    }
}
