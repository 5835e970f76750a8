use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;

use super::{ApiResult, AuthUser};
use crate::providers::GatewayNotification;
use crate::responses::{ApiOk, PageQuery, RequestMeta};
use crate::services::bonus::{self, Credited};
use crate::services::deposits::{self, DepositCheckout, NotificationOutcome};
use crate::state::AppState;
use crate::types::{Deposit, LeaderboardEntry};

#[derive(Deserialize)]
pub struct CreateDepositRequest {
    pub amount: i64,
}

#[derive(Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

pub(crate) fn deposit_routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_deposit_handler))
        .route("/notification", post(notification_handler))
        .route("/history", get(deposit_history_handler))
}

pub(crate) fn bonus_routes() -> Router<AppState> {
    Router::new()
        .route("/daily", post(daily_handler))
        .route("/redeem", post(redeem_handler))
        .route("/leaderboard", get(leaderboard_handler))
}

async fn create_deposit_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateDepositRequest>,
) -> ApiResult<DepositCheckout> {
    let checkout = deposits::create(&st, &user, req.amount, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::created("deposit created", checkout, meta))
}

/// Called by the payment gateway, not by users.
async fn notification_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    Json(req): Json<GatewayNotification>,
) -> ApiResult<NotificationOutcome> {
    let outcome = deposits::handle_notification(&st, &req, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("notification processed", outcome, meta))
}

async fn deposit_history_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<Deposit>> {
    let items = deposits::history(&st, &user)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    let (data, pagination) = page.slice(items);
    Ok(ApiOk::ok("deposits fetched", data, meta).with_pagination(pagination))
}

async fn daily_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<Credited> {
    let credited = bonus::claim_daily(&st, &user, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("daily bonus claimed", credited, meta))
}

async fn redeem_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Json(req): Json<RedeemRequest>,
) -> ApiResult<Credited> {
    let credited = bonus::redeem(&st, &user, &req.code, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("voucher redeemed", credited, meta))
}

async fn leaderboard_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    let leaders = bonus::leaderboard(&st)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("leaderboard fetched", leaders, meta))
}
