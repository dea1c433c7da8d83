//! Status callback signatures
//!
//! The provider signs every callback with HMAC-SHA1 keyed by the account
//! auth token. The signed text is the callback URL followed by each POST
//! parameter, sorted by name, written as name then value with no
//! separators. The base64 digest arrives in [`SIGNATURE_HEADER`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::warn;
use voicelink_core::{config::TelephonyConfig, AppError, AppResult};

/// Header carrying the callback signature
pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

type HmacSha1 = Hmac<Sha1>;

/// Verifies callbacks posted to the configured status callback URL
#[derive(Debug, Clone)]
pub struct CallbackValidator {
    auth_token: String,
    callback_url: String,
}

impl CallbackValidator {
    pub fn new(config: &TelephonyConfig) -> AppResult<Self> {
        if config.auth_token.is_empty() {
            return Err(AppError::Config(
                "telephony.auth_token is required to validate callbacks".to_string(),
            ));
        }
        if config.status_callback_url.is_empty() {
            return Err(AppError::Config(
                "telephony.status_callback_url is required to validate callbacks".to_string(),
            ));
        }

        Ok(Self {
            auth_token: config.auth_token.clone(),
            callback_url: config.status_callback_url.clone(),
        })
    }

    /// Signature the provider sends for `params`
    pub fn sign(&self, params: &[(String, String)]) -> AppResult<String> {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();

        let mut mac = HmacSha1::new_from_slice(self.auth_token.as_bytes())
            .map_err(|e| AppError::Config(format!("Invalid callback signing key: {}", e)))?;
        mac.update(self.callback_url.as_bytes());
        for (name, value) in sorted {
            mac.update(name.as_bytes());
            mac.update(value.as_bytes());
        }

        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Fails with `Forbidden` unless `signature` matches `params`
    pub fn verify(&self, params: &[(String, String)], signature: Option<&str>) -> AppResult<()> {
        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            warn!("Status callback without signature");
            return Err(AppError::Forbidden);
        };

        if constant_time_eq(&self.sign(params)?, signature) {
            Ok(())
        } else {
            warn!("Status callback signature mismatch");
            Err(AppError::Forbidden)
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> CallbackValidator {
        CallbackValidator {
            auth_token: "12345".to_string(),
            callback_url: "https://billing.example.com/api/v1/webhooks/telephony/call-status"
                .to_string(),
        }
    }

    fn params() -> Vec<(String, String)> {
        [
            ("CallSid", "CA1234567890ABCDE"),
            ("CallStatus", "completed"),
            ("CallDuration", "90"),
            ("To", "+8801712345678"),
            ("From", "client:user_42"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_signature_ignores_parameter_order() {
        let validator = validator();
        let mut reversed = params();
        reversed.reverse();

        let signature = validator.sign(&params()).unwrap();
        assert_eq!(signature.len(), 28);
        assert!(validator.verify(&reversed, Some(&signature)).is_ok());
    }

    #[test]
    fn test_tampered_duration_is_rejected() {
        let validator = validator();
        let signature = validator.sign(&params()).unwrap();

        let mut tampered = params();
        tampered[2].1 = "9000".to_string();
        assert!(matches!(
            validator.verify(&tampered, Some(&signature)),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn test_missing_or_foreign_signature_is_rejected() {
        let validator = validator();
        let other = CallbackValidator {
            auth_token: "other-token".to_string(),
            ..validator.clone()
        };
        let foreign = other.sign(&params()).unwrap();

        assert!(matches!(validator.verify(&params(), None), Err(AppError::Forbidden)));
        assert!(matches!(validator.verify(&params(), Some("  ")), Err(AppError::Forbidden)));
        assert!(matches!(
            validator.verify(&params(), Some(&foreign)),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn test_requires_token_and_callback_url() {
        let config = TelephonyConfig {
            api_base_url: "https://api.twilio.com".to_string(),
            account_sid: "AC123".to_string(),
            auth_token: String::new(),
            caller_id: String::new(),
            status_callback_url: "https://billing.example.com/cb".to_string(),
            request_timeout_ms: 1000,
            validate_callback_signatures: true,
        };
        assert!(matches!(CallbackValidator::new(&config), Err(AppError::Config(_))));

        let config = TelephonyConfig {
            auth_token: "secret".to_string(),
            status_callback_url: String::new(),
            ..config
        };
        assert!(matches!(CallbackValidator::new(&config), Err(AppError::Config(_))));
    }
}
