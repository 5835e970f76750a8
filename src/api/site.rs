use axum::{
    Extension, Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};

use super::ApiResult;
use crate::error::ApiErrorWithMeta;
use crate::responses::{ApiOk, RequestMeta};
use crate::services::site;
use crate::state::AppState;
use crate::types::SiteSettings;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/site", get(site_handler))
        .route("/sitemap.xml", get(sitemap_handler))
        .route("/robots.txt", get(robots_handler))
}

async fn site_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
) -> ApiResult<SiteSettings> {
    Ok(ApiOk::ok("settings fetched", site::settings(&st).await, meta))
}

async fn sitemap_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
) -> Result<Response, ApiErrorWithMeta> {
    let xml = site::sitemap(&st)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(([(header::CONTENT_TYPE, "application/xml")], xml).into_response())
}

async fn robots_handler(State(st): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        site::robots(&st),
    )
}
