use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use super::{ApiResult, AuthUser};
use crate::providers::{NumberAction, PpobService, SmmService};
use crate::responses::{ApiOk, RequestMeta};
use crate::services::nokos::{self, NokosOrderInput};
use crate::services::ppob::{self, PpobOrderInput};
use crate::services::smm::{self, SmmOrderInput};
use crate::state::AppState;
use crate::types::{NokosOrder, PpobOrder, SmmOrder};

#[derive(Deserialize)]
pub struct OperatorQuery {
    pub country: String,
    pub provider_id: String,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub action: NumberAction,
}

pub(crate) fn smm_routes() -> Router<AppState> {
    Router::new()
        .route("/services", get(smm_services_handler))
        .route("/order", post(smm_order_handler))
        .route("/history", get(smm_history_handler))
}

pub(crate) fn ppob_routes() -> Router<AppState> {
    Router::new()
        .route("/services", get(ppob_services_handler))
        .route("/order", post(ppob_order_handler))
        .route("/history", get(ppob_history_handler))
}

pub(crate) fn nokos_routes() -> Router<AppState> {
    Router::new()
        .route("/services", get(nokos_services_handler))
        .route("/countries/{service_id}", get(nokos_countries_handler))
        .route("/operators", get(nokos_operators_handler))
        .route("/order", post(nokos_order_handler))
        .route("/history", get(nokos_history_handler))
        .route(
            "/status/{order_id}",
            get(nokos_check_handler).post(nokos_set_status_handler),
        )
}

async fn smm_services_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(_user): AuthUser,
) -> ApiResult<Vec<SmmService>> {
    let services = smm::services(&st)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("services fetched", services, meta))
}

async fn smm_order_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Json(req): Json<SmmOrderInput>,
) -> ApiResult<SmmOrder> {
    let order = smm::order(&st, &user, req, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::created("order placed", order, meta))
}

async fn smm_history_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<SmmOrder>> {
    let orders = smm::history(&st, &user)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("orders fetched", orders, meta))
}

async fn ppob_services_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(_user): AuthUser,
) -> ApiResult<Vec<PpobService>> {
    let services = ppob::services(&st)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("services fetched", services, meta))
}

async fn ppob_order_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Json(req): Json<PpobOrderInput>,
) -> ApiResult<PpobOrder> {
    let order = ppob::order(&st, &user, req, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::created("order placed", order, meta))
}

async fn ppob_history_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<PpobOrder>> {
    let orders = ppob::history(&st, &user)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("orders fetched", orders, meta))
}

async fn nokos_services_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(_user): AuthUser,
) -> ApiResult<Value> {
    let services = nokos::services(&st)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("services fetched", services, meta))
}

async fn nokos_countries_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(_user): AuthUser,
    Path(service_id): Path<String>,
) -> ApiResult<Value> {
    let countries = nokos::countries(&st, &service_id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("countries fetched", countries, meta))
}

async fn nokos_operators_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(_user): AuthUser,
    Query(q): Query<OperatorQuery>,
) -> ApiResult<Value> {
    let operators = nokos::operators(&st, &q.country, &q.provider_id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("operators fetched", operators, meta))
}

async fn nokos_order_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Json(req): Json<NokosOrderInput>,
) -> ApiResult<NokosOrder> {
    let order = nokos::order(&st, &user, req, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::created("number rented", order, meta))
}

async fn nokos_history_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<NokosOrder>> {
    let orders = nokos::history(&st, &user)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("orders fetched", orders, meta))
}

async fn nokos_check_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Path(order_id): Path<String>,
) -> ApiResult<NokosOrder> {
    let order = nokos::check_status(&st, &user, &order_id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("status fetched", order, meta))
}

async fn nokos_set_status_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Path(order_id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<NokosOrder> {
    let order = nokos::set_status(&st, &user, &order_id, req.action)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("status updated", order, meta))
}
