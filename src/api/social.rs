use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiResult, AuthUser};
use crate::responses::{ApiOk, RequestMeta};
use crate::services::chat::{self, Conversation, Thread};
use crate::services::news;
use crate::state::AppState;
use crate::types::{ChatMessage, News};

#[derive(Deserialize)]
pub struct SendRequest {
    pub message: String,
}

pub(crate) fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(conversations_handler))
        .route("/{partner_id}", get(thread_handler).post(send_handler))
}

pub(crate) fn news_routes() -> Router<AppState> {
    Router::new().route("/{slug}", get(news_detail_handler))
}

async fn conversations_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<Conversation>> {
    let conversations = chat::conversations(&st, &user)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("conversations fetched", conversations, meta))
}

async fn thread_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Path(partner_id): Path<Uuid>,
) -> ApiResult<Thread> {
    let thread = chat::thread(&st, &user, partner_id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("thread fetched", thread, meta))
}

async fn send_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Path(partner_id): Path<Uuid>,
    Json(req): Json<SendRequest>,
) -> ApiResult<ChatMessage> {
    let message = chat::send(&st, &user, partner_id, &req.message, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::created("message sent", message, meta))
}

async fn news_detail_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    Path(slug): Path<String>,
) -> ApiResult<News> {
    let news = news::detail(&st, &slug)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("news fetched", news, meta))
}
