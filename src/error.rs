use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::providers::ProviderError;
use crate::responses::RequestMeta;
use crate::store::StoreError;

pub const E_BAD_AMOUNT: &str = "BAD_AMOUNT";
pub const E_BAD_REQUEST: &str = "BAD_REQUEST";
pub const E_DB_FAILURE: &str = "DB_FAILURE";
pub const E_CONFLICT: &str = "CONFLICT";
pub const E_FORBIDDEN: &str = "FORBIDDEN";
pub const E_INSUFFICIENT_BALANCE: &str = "INSUFFICIENT_BALANCE";
pub const E_INVALID_SIGNATURE: &str = "INVALID_SIGNATURE";
pub const E_MAINTENANCE: &str = "MAINTENANCE";
pub const E_NOT_FOUND: &str = "NOT_FOUND";
pub const E_PRICE_CHANGED: &str = "PRICE_CHANGED";
pub const E_PROVIDER_FAILURE: &str = "PROVIDER_FAILURE";
pub const E_TOO_EARLY: &str = "TOO_EARLY";
pub const E_TWO_FACTOR_REQUIRED: &str = "TWO_FACTOR_REQUIRED";
pub const E_UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const E_VOUCHER_INVALID: &str = "VOUCHER_INVALID";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

#[derive(Debug)]
pub struct ApiErrorWithMeta {
    error: ApiError,
    meta: RequestMeta,
    code: Option<String>,
}

impl ApiError {
    pub fn with_meta(self, meta: RequestMeta) -> ApiErrorWithMeta {
        ApiErrorWithMeta {
            error: self,
            meta,
            code: None,
        }
    }
}

impl ApiErrorWithMeta {
    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }
}

impl IntoResponse for ApiErrorWithMeta {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.error {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(e) => {
                error!("internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let mut body = json!({
            "request_id": self.meta.request_id,
            "error": error_message,
        });
        if let Some(code) = self.code {
            body["code"] = json!(code);
        }

        (status, Json(body)).into_response()
    }
}

/// Failures of the storefront's business operations.
#[derive(Debug, thiserror::Error)]
pub enum ShopError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("amount must be at least {min}")]
    AmountTooSmall { min: i64 },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Unauthorized(String),
    #[error("two-factor token required")]
    TwoFactorRequired,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: i64, available: i64 },
    #[error("voucher is invalid, expired or already used")]
    VoucherInvalid,
    #[error("price changed: quoted {quoted}, current {current}")]
    PriceChanged { quoted: i64, current: i64 },
    #[error("try again in {remaining_ms} ms")]
    TooEarly { remaining_ms: i64 },
    #[error("invalid notification signature")]
    InvalidSignature,
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ShopResult<T> = Result<T, ShopError>;

impl ShopError {
    pub fn code(&self) -> &'static str {
        match self {
            ShopError::InvalidInput(_) => E_BAD_REQUEST,
            ShopError::AmountTooSmall { .. } => E_BAD_AMOUNT,
            ShopError::NotFound(_) => E_NOT_FOUND,
            ShopError::Unauthorized(_) => E_UNAUTHORIZED,
            ShopError::TwoFactorRequired => E_TWO_FACTOR_REQUIRED,
            ShopError::Forbidden(_) => E_FORBIDDEN,
            ShopError::Conflict(_) => E_CONFLICT,
            ShopError::InsufficientBalance { .. } => E_INSUFFICIENT_BALANCE,
            ShopError::VoucherInvalid => E_VOUCHER_INVALID,
            ShopError::PriceChanged { .. } => E_PRICE_CHANGED,
            ShopError::TooEarly { .. } => E_TOO_EARLY,
            ShopError::InvalidSignature => E_INVALID_SIGNATURE,
            ShopError::Provider(_) => E_PROVIDER_FAILURE,
            ShopError::Store(StoreError::NotFound(_)) => E_NOT_FOUND,
            ShopError::Store(StoreError::Conflict(_)) => E_CONFLICT,
            ShopError::Store(_) | ShopError::Internal(_) => E_DB_FAILURE,
        }
    }

    pub fn with_meta(self, meta: RequestMeta) -> ApiErrorWithMeta {
        let code = self.code();
        let error = match self {
            ShopError::InvalidInput(_)
            | ShopError::AmountTooSmall { .. }
            | ShopError::InsufficientBalance { .. }
            | ShopError::VoucherInvalid
            | ShopError::PriceChanged { .. } => ApiError::BadRequest(self.to_string()),
            ShopError::TooEarly { .. } => ApiError::Conflict(self.to_string()),
            ShopError::NotFound(_) | ShopError::Store(StoreError::NotFound(_)) => {
                ApiError::NotFound(self.to_string())
            }
            ShopError::Unauthorized(_)
            | ShopError::TwoFactorRequired
            | ShopError::InvalidSignature => ApiError::Unauthorized(self.to_string()),
            ShopError::Forbidden(_) => ApiError::Forbidden(self.to_string()),
            ShopError::Conflict(_) | ShopError::Store(StoreError::Conflict(_)) => {
                ApiError::Conflict(self.to_string())
            }
            ShopError::Provider(e) => ApiError::BadGateway(e.to_string()),
            ShopError::Store(e) => ApiError::Internal(e.into()),
            ShopError::Internal(e) => ApiError::Internal(e),
        };
        error.with_meta(meta).with_code(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_carry_stable_codes() {
        assert_eq!(
            ShopError::InsufficientBalance {
                required: 10,
                available: 5
            }
            .code(),
            E_INSUFFICIENT_BALANCE
        );
        assert_eq!(
            ShopError::Store(StoreError::NotFound("user")).code(),
            E_NOT_FOUND
        );
        assert_eq!(
            ShopError::Provider(ProviderError::Rejected("nope".into())).code(),
            E_PROVIDER_FAILURE
        );
    }
}
