//! HTTP surface. Handlers unpack the request, call into `services` and wrap
//! the outcome in the response envelope.

mod accounts;
mod admin;
mod extract;
mod marketplace;
mod orders;
mod site;
mod social;
mod wallet;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub use extract::{AdminUser, AuthUser, MaybeUser};

use crate::error::{ApiError, ApiErrorWithMeta, E_MAINTENANCE};
use crate::responses::{ApiOk, RequestMeta, meta_middleware, new_meta};
use crate::services;
use crate::state::AppState;

pub(crate) type ApiResult<T> = Result<ApiOk<T>, ApiErrorWithMeta>;

pub fn init_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(accounts::routes())
        .nest("/deposit", wallet::deposit_routes())
        .nest("/bonus", wallet::bonus_routes())
        .nest("/marketplace", marketplace::routes())
        .nest("/smm", orders::smm_routes())
        .nest("/ppob", orders::ppob_routes())
        .nest("/nokos", orders::nokos_routes())
        .nest("/chat", social::chat_routes())
        .nest("/news", social::news_routes())
        .nest("/admin", admin::routes())
        .merge(site::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            maintenance_gate,
        ))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(middleware::from_fn(meta_middleware))
}

/// Answers 503 while maintenance is on, except for exempt paths and
/// administrators.
async fn maintenance_gate(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if services::site::bypasses_maintenance(req.uri().path()) {
        return next.run(req).await;
    }
    let settings = services::site::settings(&state).await;
    if !settings.is_maintenance {
        return next.run(req).await;
    }
    if let Some(token) = extract::bearer_token(req.headers()) {
        if let Ok(user) = extract::session_user(&state, token).await {
            if user.role.is_admin() {
                return next.run(req).await;
            }
        }
    }
    let meta = req
        .extensions()
        .get::<RequestMeta>()
        .cloned()
        .unwrap_or_else(new_meta);
    ApiError::Unavailable(settings.maintenance_message)
        .with_meta(meta)
        .with_code(E_MAINTENANCE)
        .into_response()
}
