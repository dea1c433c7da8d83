//! Call rate handlers

use crate::dto::{
    ApiResponse, CallRateResponse, CreateCallRateRequest, RateQuoteQuery, RateQuoteResponse,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use tracing::{info, instrument, warn};
use validator::Validate;
use voicelink_auth::AdminUser;
use voicelink_core::models::NewCallRate;
use voicelink_core::AppError;

/// GET /api/v1/call-rates
#[instrument(skip(state))]
pub async fn list_call_rates(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let rates = state.rates.list_active().await?;
    let data: Vec<CallRateResponse> = rates.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

/// GET /api/v1/call-rates/calculate?number=
#[instrument(skip(state))]
pub async fn calculate_rate(
    state: web::Data<AppState>,
    query: web::Query<RateQuoteQuery>,
) -> Result<HttpResponse, AppError> {
    let number = query.number.trim();
    if number.is_empty() {
        return Err(AppError::InvalidInput("number is required".to_string()));
    }

    let rate = state
        .rates
        .resolve(number)
        .await?
        .ok_or_else(|| AppError::RateUnavailable(number.to_string()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(RateQuoteResponse::new(number, rate))))
}

/// POST /api/v1/call-rates
#[instrument(skip(state, admin, req), fields(admin_id = %admin.user_id))]
pub async fn create_call_rate(
    state: web::Data<AppState>,
    admin: AdminUser,
    req: web::Json<CreateCallRateRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Call rate validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let created = state
        .rates
        .register(&NewCallRate::from(req.into_inner()))
        .await?;
    info!(id = created.id, prefix = %created.prefix, "Call rate created");

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        CallRateResponse::from(created),
        "Call rate created successfully",
    )))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/call-rates")
            .service(
                web::resource("")
                    .route(web::get().to(list_call_rates))
                    .route(web::post().to(create_call_rate)),
            )
            .route("/calculate", web::get().to(calculate_rate)),
    );
}
