//! Wallet handlers

use crate::dto::{
    ApiResponse, BalanceResponse, LimitParams, RechargeRequest, RechargeResponse,
    TransactionResponse,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use tracing::{instrument, warn};
use validator::Validate;
use voicelink_auth::AuthenticatedUser;
use voicelink_core::AppError;

/// GET /api/v1/wallet/balance
#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_balance(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let balance = state.ledger.get_balance(user.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(BalanceResponse { balance })))
}

/// POST /api/v1/wallet/recharge
#[instrument(skip(state, user, req), fields(user_id = %user.user_id))]
pub async fn recharge(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    req: web::Json<RechargeRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Recharge validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let req = req.into_inner();
    let (balance, transaction) = state
        .ledger
        .recharge(user.user_id, req.amount, req.payment_method, req.reference_id)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        RechargeResponse {
            balance,
            transaction: transaction.into(),
        },
        "Recharge successful",
    )))
}

/// GET /api/v1/wallet/transactions
#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn list_transactions(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<LimitParams>,
) -> Result<HttpResponse, AppError> {
    let limit = state.billing.history_limit(query.limit);
    let transactions = state.ledger.transactions(user.user_id, limit).await?;

    let data: Vec<TransactionResponse> = transactions.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/wallet")
            .route("/balance", web::get().to(get_balance))
            .route("/recharge", web::post().to(recharge))
            .route("/transactions", web::get().to(list_transactions)),
    );
}
