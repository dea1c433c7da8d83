//! REST client for the voice provider
//!
//! Outbound calls are placed by dialing the user's client identity and
//! bridging it to the destination with inline TwiML. The provider reports
//! the final state of the call to the configured status callback.

use crate::callback;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, instrument};
use voicelink_core::config::TelephonyConfig;
use voicelink_core::traits::TelephonyProvider;
use voicelink_core::{AppError, AppResult};

/// Subset of the call resource returned on creation
#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

/// Error body returned on non-2xx responses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

pub struct TwilioClient {
    http_client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    caller_id: String,
    status_callback_url: String,
    timeout_ms: u64,
}

impl TwilioClient {
    pub fn new(config: &TelephonyConfig) -> AppResult<Self> {
        if config.account_sid.trim().is_empty() {
            return Err(AppError::Config(
                "telephony.account_sid must be set".to_string(),
            ));
        }

        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            caller_id: config.caller_id.clone(),
            status_callback_url: config.status_callback_url.clone(),
            timeout_ms: config.request_timeout_ms,
        })
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.base_url, self.account_sid
        )
    }

    fn bridge_twiml(&self, destination: &str) -> String {
        format!(
            "<Response><Dial callerId=\"{}\">{}</Dial></Response>",
            escape_xml(&self.caller_id),
            escape_xml(destination)
        )
    }

    #[instrument(skip(self), fields(destination = %destination))]
    async fn create_call(&self, billing_identity: &str, destination: &str) -> AppResult<CallResource> {
        let to = format!("client:{}", billing_identity);
        let twiml = self.bridge_twiml(destination);
        let mut form = vec![
            ("To", to.as_str()),
            ("From", self.caller_id.as_str()),
            ("Twiml", twiml.as_str()),
        ];
        if !self.status_callback_url.is_empty() {
            form.push(("StatusCallback", self.status_callback_url.as_str()));
            form.push(("StatusCallbackEvent", callback::STATUS_EVENTS));
            form.push(("StatusCallbackMethod", callback::METHOD));
        }

        let response = self
            .http_client
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!("Provider request timed out after {}ms", self.timeout_ms);
                    AppError::Provider(format!("request timed out after {}ms", self.timeout_ms))
                } else {
                    error!("Provider request failed: {}", e);
                    AppError::Provider(format!("connection error: {}", e))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::Provider(format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| match (b.code, b.message) {
                    (Some(code), Some(message)) => Some(format!("{} ({})", message, code)),
                    (None, Some(message)) => Some(message),
                    _ => None,
                })
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            error!(status = status.as_u16(), "Provider rejected call: {}", detail);
            return Err(AppError::Provider(detail));
        }

        serde_json::from_str::<CallResource>(&body).map_err(|e| {
            error!("Unexpected provider response: {}", e);
            AppError::Provider(format!("Failed to parse call resource: {}", e))
        })
    }
}

#[async_trait]
impl TelephonyProvider for TwilioClient {
    async fn place_call(&self, billing_identity: &str, destination: &str) -> AppResult<String> {
        let call = self.create_call(billing_identity, destination).await?;
        debug!(
            call_sid = %call.sid,
            status = call.status.as_deref().unwrap_or("unknown"),
            "Provider call created"
        );
        Ok(call.sid)
    }
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
