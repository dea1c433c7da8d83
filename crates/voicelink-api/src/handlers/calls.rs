//! Call handlers
//!
//! Admission, provider call linking and call history for the
//! authenticated user.

use crate::dto::{
    ApiResponse, CallRecordResponse, InitiateCallRequest, InitiateCallResponse, LimitParams,
    LinkCallRequest,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use validator::Validate;
use voicelink_auth::AuthenticatedUser;
use voicelink_core::AppError;

/// POST /api/v1/calls/initiate
#[instrument(skip(state, user, req), fields(user_id = %user.user_id))]
pub async fn initiate_call(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    req: web::Json<InitiateCallRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Call initiation validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let req = req.into_inner();
    debug!(kind = %req.kind, destination = %req.destination_number, "Initiating call");

    let result = state
        .admission
        .admit(user.user_id, &req.destination_number, req.kind)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        InitiateCallResponse::from(result),
        "Call initiated",
    )))
}

/// POST /api/v1/calls/{id}/link
#[instrument(skip(state, user, req), fields(user_id = %user.user_id))]
pub async fn link_call(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<LinkCallRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Call link validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let record = state
        .admission
        .link_provider_call(user.user_id, path.into_inner(), &req.provider_call_id)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(CallRecordResponse::from(record))))
}

/// GET /api/v1/calls/history
#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn call_history(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<LimitParams>,
) -> Result<HttpResponse, AppError> {
    let limit = state.billing.history_limit(query.limit);
    let records = state.admission.history(user.user_id, limit).await?;

    let data: Vec<CallRecordResponse> = records.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/calls")
            .route("/initiate", web::post().to(initiate_call))
            .route("/history", web::get().to(call_history))
            .route("/{id}/link", web::post().to(link_call)),
    );
}
