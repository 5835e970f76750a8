use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    routing::{get, post, put},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiResult, AuthUser, MaybeUser};
use crate::responses::{ApiOk, PageQuery, RequestMeta};
use crate::services::marketplace::{self, ProductDetail, ProductInput, Receipt, SellerStore};
use crate::state::AppState;
use crate::store::{ProductQuery, ProductSort};
use crate::types::{Product, Purchase};

#[derive(Deserialize)]
pub struct BrowseQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort: ProductSort,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl BrowseQuery {
    fn page(&self) -> PageQuery {
        let default = PageQuery::default();
        PageQuery {
            page: self.page.unwrap_or(default.page),
            per_page: self.per_page.unwrap_or(default.per_page),
        }
    }
}

#[derive(Deserialize)]
pub struct BuyRequest {
    #[serde(default)]
    pub voucher_code: Option<String>,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub rating: i32,
    #[serde(default)]
    pub comment: Option<String>,
}

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(browse_handler))
        .route("/product/{slug}", get(detail_handler))
        .route("/store/{username}", get(store_handler))
        .route("/products", post(create_handler))
        .route("/products/{id}", put(update_handler).delete(delete_handler))
        .route("/products/{id}/buy", post(buy_handler))
        .route("/products/{id}/review", post(review_handler))
        .route("/purchases", get(purchases_handler))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn browse_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    Query(q): Query<BrowseQuery>,
) -> ApiResult<Vec<Product>> {
    let page = q.page();
    let query = ProductQuery {
        category: non_empty(q.category),
        search: non_empty(q.search),
        sort: q.sort,
    };
    let products = marketplace::browse(&st, &query)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    let (data, pagination) = page.slice(products);
    Ok(ApiOk::ok("products fetched", data, meta).with_pagination(pagination))
}

async fn detail_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    MaybeUser(viewer): MaybeUser,
    Path(slug): Path<String>,
) -> ApiResult<ProductDetail> {
    let detail = marketplace::detail(&st, &slug, viewer.as_ref(), Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("product fetched", detail, meta))
}

async fn store_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    Path(username): Path<String>,
) -> ApiResult<SellerStore> {
    let store = marketplace::seller_store(&st, &username)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("store fetched", store, meta))
}

async fn create_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Json(req): Json<ProductInput>,
) -> ApiResult<Product> {
    let product = marketplace::create_product(&st, &user, req, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::created("product created", product, meta))
}

async fn update_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ProductInput>,
) -> ApiResult<Product> {
    let product = marketplace::update_product(&st, &user, id, req)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("product updated", product, meta))
}

async fn delete_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    marketplace::delete_product(&st, &user, id)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("product deleted", (), meta))
}

async fn buy_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<BuyRequest>,
) -> ApiResult<Receipt> {
    let receipt = marketplace::buy(&st, &user, id, req.voucher_code.as_deref(), Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::created("purchase completed", receipt, meta))
}

async fn review_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> ApiResult<Product> {
    let product = marketplace::review(&st, &user, id, req.rating, req.comment, Utc::now())
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::created("review added", product, meta))
}

async fn purchases_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<Purchase>> {
    let purchases = marketplace::purchases(&st, &user)
        .await
        .map_err(|e| e.with_meta(meta.clone()))?;
    Ok(ApiOk::ok("purchases fetched", purchases, meta))
}
