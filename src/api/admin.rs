use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::{AdminUser, ApiResult};
use crate::responses::{ApiOk, RequestMeta};
use crate::services::admin::{self, Broadcast, FlashSaleInput, Stats, UserEdit, VoucherInput};
use crate::services::news::{self, NewsInput};
use crate::state::AppState;
use crate::types::{News, Product, SiteSettings, User, Voucher};

#[derive(Serialize)]
pub struct BroadcastResponse {
    pub recipients: usize,
}

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats_handler))
        .route("/users", get(users_handler))
        .route("/users/{id}", get(user_handler).put(update_user_handler))
        .route("/settings", get(settings_handler).put(update_settings_handler))
        .route("/broadcast", post(broadcast_handler))
        .route("/news", get(news_list_handler).post(create_news_handler))
        .route("/news/{id}", put(update_news_handler).delete(delete_news_handler))
        .route("/vouchers", get(vouchers_handler).post(create_voucher_handler))
        .route("/flash-sale", get(flash_sales_handler).post(set_flash_sale_handler))
}

async fn stats_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Stats> {
    let stats = admin::stats(&st)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("stats fetched", stats, meta))
}

async fn users_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Vec<User>> {
    let users = admin::users(&st)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("users fetched", users, meta))
}

async fn user_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<User> {
    let user = admin::user(&st, id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("user fetched", user, meta))
}

async fn update_user_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UserEdit>,
) -> ApiResult<User> {
    let user = admin::update_user(&st, &admin, id, req)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("user updated", user, meta))
}

async fn settings_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<SiteSettings> {
    Ok(ApiOk::ok("settings fetched", admin::settings(&st).await, meta))
}

async fn update_settings_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
    Json(req): Json<SiteSettings>,
) -> ApiResult<SiteSettings> {
    let settings = admin::update_settings(&st, req)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("settings saved", settings, meta))
}

async fn broadcast_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
    Json(req): Json<Broadcast>,
) -> ApiResult<BroadcastResponse> {
    let recipients = admin::broadcast(&st, req)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok(
        "broadcast queued",
        BroadcastResponse { recipients },
        meta,
    ))
}

async fn news_list_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Vec<News>> {
    let news = news::list(&st)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("news fetched", news, meta))
}

async fn create_news_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(admin): AdminUser,
    Json(req): Json<NewsInput>,
) -> ApiResult<News> {
    let news = news::create(&st, &admin, req, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::created("news published", news, meta))
}

async fn update_news_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<NewsInput>,
) -> ApiResult<News> {
    let news = news::update(&st, id, req, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("news updated", news, meta))
}

async fn delete_news_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    news::delete(&st, id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("news deleted", (), meta))
}

async fn vouchers_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Vec<Voucher>> {
    let vouchers = admin::vouchers(&st)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("vouchers fetched", vouchers, meta))
}

async fn create_voucher_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
    Json(req): Json<VoucherInput>,
) -> ApiResult<Voucher> {
    let voucher = admin::create_voucher(&st, req, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::created("voucher created", voucher, meta))
}

async fn flash_sales_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Vec<Product>> {
    let products = admin::flash_sales(&st)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("products fetched", products, meta))
}

async fn set_flash_sale_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AdminUser(_admin): AdminUser,
    Json(req): Json<FlashSaleInput>,
) -> ApiResult<Product> {
    let product = admin::set_flash_sale(&st, req, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("flash sale set", product, meta))
}
