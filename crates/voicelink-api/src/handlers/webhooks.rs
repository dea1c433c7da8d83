//! Telephony provider webhooks
//!
//! The provider retries on non-2xx responses, so every outcome that a retry
//! cannot change (settled, duplicate, ignored, unknown call) is
//! acknowledged with 200. Only internal faults surface as errors. When a
//! [`CallbackValidator`](voicelink_telephony::CallbackValidator) is configured, unsigned or forged callbacks are
//! refused with 403 before anything is parsed.

use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use voicelink_core::AppError;
use voicelink_services::SettlementOutcome;
use voicelink_telephony::{CallStatusEvent, CallStatusForm, SIGNATURE_HEADER};

fn ack(status: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": status }))
}

/// POST /api/v1/webhooks/telephony/call-status
#[instrument(skip_all)]
pub async fn call_status(
    req: HttpRequest,
    state: web::Data<AppState>,
    form: web::Form<Vec<(String, String)>>,
) -> Result<HttpResponse, AppError> {
    let params = form.into_inner();
    if let Some(validator) = state.callbacks.as_deref() {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        validator.verify(&params, signature)?;
    }

    let event = CallStatusEvent::from_form(CallStatusForm::from_pairs(&params)).map_err(|e| {
        warn!("Rejected malformed status callback: {}", e);
        e
    })?;

    let Some(final_status) = event.final_status() else {
        debug!(
            call_sid = %event.provider_call_id,
            status = %event.status,
            "Ignoring non-terminal call status"
        );
        return Ok(ack("ignored"));
    };

    match state
        .settlement
        .settle(&event.provider_call_id, final_status, event.duration_seconds)
        .await
    {
        Ok(SettlementOutcome::Settled(settled)) => {
            info!(
                call_sid = %event.provider_call_id,
                cost = %settled.record.cost,
                "Status callback settled call"
            );
            Ok(ack("settled"))
        }
        Ok(SettlementOutcome::AlreadySettled) => Ok(ack("duplicate")),
        Err(AppError::CallRecordNotFound(_)) => {
            warn!(call_sid = %event.provider_call_id, "Status callback for unknown call");
            Ok(ack("unknown_call"))
        }
        Err(e) => {
            error!(call_sid = %event.provider_call_id, "Settlement from callback failed: {}", e);
            Err(e)
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/webhooks/telephony").route("/call-status", web::post().to(call_status)),
    );
}
