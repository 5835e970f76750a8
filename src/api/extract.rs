//! Session extractors. A bearer token is verified, then the account is read
//! back from the store so role changes and bans apply immediately.

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};

use crate::error::{ApiErrorWithMeta, ShopError};
use crate::responses::{RequestMeta, new_meta};
use crate::state::AppState;
use crate::types::{Role, User};

pub(crate) fn request_meta(parts: &Parts) -> RequestMeta {
    parts
        .extensions
        .get::<RequestMeta>()
        .cloned()
        .unwrap_or_else(new_meta)
}

pub(crate) fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves a bearer token to a non-banned account.
pub(crate) async fn session_user(state: &AppState, token: &str) -> Result<User, ShopError> {
    let claims = state.jwt.verify(token)?;
    let user = state
        .store
        .user(claims.sub)
        .await?
        .ok_or_else(|| ShopError::Unauthorized("account no longer exists".to_string()))?;
    if user.role == Role::Banned {
        return Err(ShopError::Forbidden("account is banned".to_string()));
    }
    Ok(user)
}

/// A signed-in account.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiErrorWithMeta;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let meta = request_meta(parts);
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            ShopError::Unauthorized("missing bearer token".to_string()).with_meta(meta.clone())
        })?;
        session_user(state, token)
            .await
            .map(AuthUser)
            .map_err(|e| e.with_meta(meta))
    }
}

/// A signed-in administrator.
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiErrorWithMeta;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            return Err(ShopError::Forbidden("administrators only".to_string())
                .with_meta(request_meta(parts)));
        }
        Ok(AdminUser(user))
    }
}

/// The signed-in account if the request carries a valid session.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiErrorWithMeta;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = match bearer_token(&parts.headers) {
            Some(token) => session_user(state, token).await.ok(),
            None => None,
        };
        Ok(MaybeUser(user))
    }
}
