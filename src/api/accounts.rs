use axum::{
    Extension, Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;

use super::{ApiResult, AuthUser};
use crate::responses::{ApiOk, RequestMeta};
use crate::services::accounts::{
    self, Affiliate, Dashboard, LoginInput, ProfileUpdate, RegisterInput, Session, TwoFactorSetup,
};
use crate::state::AppState;
use crate::types::{News, User};

#[derive(Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/information", get(information_handler))
        .route("/affiliate", get(affiliate_handler))
        .route("/profile", get(profile_handler).put(update_profile_handler))
        .route("/profile/verify/request", post(verify_request_handler))
        .route("/profile/verify/check", post(verify_check_handler))
        .route("/profile/2fa/setup", post(two_factor_setup_handler))
        .route("/profile/2fa/enable", post(two_factor_enable_handler))
        .route("/profile/2fa/disable", post(two_factor_disable_handler))
}

async fn register_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    Json(req): Json<RegisterInput>,
) -> ApiResult<User> {
    let user = accounts::register(&st, req, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::created("account registered", user, meta))
}

async fn login_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    Json(req): Json<LoginInput>,
) -> ApiResult<Session> {
    let session = accounts::login(&st, req, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("signed in", session, meta))
}

async fn dashboard_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<Dashboard> {
    let dashboard = accounts::dashboard(&st, &user, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("dashboard fetched", dashboard, meta))
}

async fn information_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<News>> {
    let news = accounts::information(&st, &user)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("information fetched", news, meta))
}

async fn affiliate_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<Affiliate> {
    Ok(ApiOk::ok(
        "affiliate fetched",
        accounts::affiliate(&st, &user),
        meta,
    ))
}

async fn profile_handler(
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<User> {
    Ok(ApiOk::ok("profile fetched", user, meta))
}

async fn update_profile_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Json(req): Json<ProfileUpdate>,
) -> ApiResult<User> {
    let user = accounts::update_profile(&st, &user, req)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("profile updated", user, meta))
}

async fn verify_request_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<()> {
    accounts::request_verification(&st, &user)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("verification code sent", (), meta))
}

async fn verify_check_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Json(req): Json<CodeRequest>,
) -> ApiResult<User> {
    let user = accounts::check_verification(&st, &user, &req.code)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("email verified", user, meta))
}

async fn two_factor_setup_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<TwoFactorSetup> {
    let setup = accounts::setup_two_factor(&st, &user)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("two-factor secret generated", setup, meta))
}

async fn two_factor_enable_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Json(req): Json<TokenRequest>,
) -> ApiResult<()> {
    accounts::enable_two_factor(&st, &user, &req.token, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("two-factor enabled", (), meta))
}

async fn two_factor_disable_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<()> {
    accounts::disable_two_factor(&st, &user)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("two-factor disabled", (), meta))
}
