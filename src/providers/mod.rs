//! Outbound vendor integrations: payment gateway, SMM/PPOB reseller and the
//! virtual number vendor.
//!
//! Read-only lookups (catalogues, statuses) are retried with exponential
//! backoff. Anything that places an order or moves money at the vendor is
//! sent exactly once.

mod jagoan;
mod midtrans;
pub mod mock;
mod rumahotp;

use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::future::retry;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use jagoan::JagoanClient;
pub use midtrans::{MidtransClient, notification_signature};
pub use rumahotp::RumahOtpClient;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    /// The vendor answered but refused the request.
    #[error("{0}")]
    Rejected(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("rate limited")]
    RateLimited,
}

pub type ProviderResult<T> = Result<T, ProviderError>;

// Payment gateway.

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub order_id: String,
    pub amount: i64,
    pub customer_name: String,
    pub customer_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub token: String,
    pub redirect_url: String,
}

/// Transaction state as reported by the gateway's status API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GatewayStatus {
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
}

impl GatewayStatus {
    /// `capture` accepted by fraud screening, or `settlement`.
    pub fn is_paid(&self) -> bool {
        match self.transaction_status.as_str() {
            "capture" => self.fraud_status.as_deref() == Some("accept"),
            "settlement" => true,
            _ => false,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self.transaction_status.as_str(),
            "cancel" | "deny" | "expire"
        )
    }
}

/// HTTP notification body posted by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayNotification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    #[serde(default)]
    pub transaction_status: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Requests a hosted-checkout token.
    async fn create_checkout(&self, request: &CheckoutRequest) -> ProviderResult<Checkout>;
    async fn transaction_status(&self, order_id: &str) -> ProviderResult<GatewayStatus>;
    /// Checks the notification's `signature_key` against the server key.
    fn verify_notification(&self, notification: &GatewayNotification) -> bool;
    /// Public key handed to the browser checkout widget.
    fn client_key(&self) -> &str;
}

// SMM.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmmService {
    pub id: String,
    pub name: String,
    pub category: String,
    /// Price per 1000 units.
    pub rate: Decimal,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmmOrderRequest {
    pub service_id: String,
    pub target: String,
    pub quantity: i64,
    pub custom_comments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmmStatus {
    pub status: String,
    pub start_count: i64,
    pub remains: i64,
}

#[async_trait]
pub trait SmmProvider: Send + Sync {
    async fn services(&self) -> ProviderResult<Vec<SmmService>>;
    /// Places an order and returns the vendor's order id.
    async fn place_order(&self, request: &SmmOrderRequest) -> ProviderResult<String>;
    async fn status(&self, provider_order_id: &str) -> ProviderResult<SmmStatus>;
    /// Our deposit balance at the vendor.
    async fn balance(&self) -> ProviderResult<i64>;
}

// PPOB.

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PpobService {
    pub code: String,
    pub name: String,
    pub category: String,
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PpobOrderRequest {
    pub service_code: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PpobStatus {
    pub status: String,
    pub sn: Option<String>,
}

#[async_trait]
pub trait PpobProvider: Send + Sync {
    async fn services(&self) -> ProviderResult<Vec<PpobService>>;
    async fn place_order(&self, request: &PpobOrderRequest) -> ProviderResult<String>;
    async fn status(&self, provider_order_id: &str) -> ProviderResult<PpobStatus>;
}

// Virtual numbers.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberRental {
    pub order_id: String,
    pub phone_number: String,
    pub service: String,
    pub country: String,
    pub expires_in_minute: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberStatus {
    pub status: String,
    pub otp_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberAction {
    Cancel,
    Done,
}

impl NumberAction {
    pub fn as_str(self) -> &'static str {
        match self {
            NumberAction::Cancel => "cancel",
            NumberAction::Done => "done",
        }
    }
}

/// Catalogue lookups return the vendor's JSON untouched; the client renders
/// them directly.
#[async_trait]
pub trait NumberProvider: Send + Sync {
    async fn services(&self) -> ProviderResult<Value>;
    async fn countries(&self, service_id: &str) -> ProviderResult<Value>;
    async fn operators(&self, country: &str, provider_id: &str) -> ProviderResult<Value>;
    async fn rent(
        &self,
        number_id: &str,
        provider_id: &str,
        operator_id: &str,
    ) -> ProviderResult<NumberRental>;
    async fn status(&self, order_id: &str) -> ProviderResult<NumberStatus>;
    async fn set_status(&self, order_id: &str, action: NumberAction) -> ProviderResult<()>;
}

fn read_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(20)),
        ..Default::default()
    }
}

fn into_inner(e: backoff::Error<ProviderError>) -> ProviderError {
    match e {
        backoff::Error::Permanent(err) | backoff::Error::Transient { err, .. } => err,
    }
}

/// Sends the request built by `build` and decodes a JSON body. With
/// `retry_transient`, network failures, 429 and 5xx answers are retried.
pub(crate) async fn fetch_json<F>(build: F, retry_transient: bool) -> ProviderResult<Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let attempt = || async {
        let response = build().send().await.map_err(|e| {
            backoff::Error::transient(ProviderError::Network(e.to_string()))
        })?;

        let status = response.status();
        if status == 429 {
            return Err(backoff::Error::transient(ProviderError::RateLimited));
        }
        if status.is_server_error() {
            return Err(backoff::Error::transient(ProviderError::Http {
                status: status.as_u16(),
                message: "Server error".to_string(),
            }));
        }
        if !status.is_success() && status != 404 {
            return Err(backoff::Error::permanent(ProviderError::Http {
                status: status.as_u16(),
                message: "Client error".to_string(),
            }));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| backoff::Error::permanent(ProviderError::Parse(e.to_string())))
    };

    if retry_transient {
        retry(read_backoff(), attempt).await
    } else {
        attempt().await.map_err(into_inner)
    }
}

/// Unwraps the `{success, data, error}` envelope both resellers use.
pub(crate) fn envelope_data(body: Value) -> ProviderResult<Value> {
    if body.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(body.get("data").cloned().unwrap_or(Value::Null));
    }
    let reason = body
        .get("error")
        .or_else(|| body.get("message"))
        .or_else(|| body.get("data").and_then(|d| d.get("msg")))
        .and_then(Value::as_str)
        .unwrap_or("request rejected by provider");
    Err(ProviderError::Rejected(reason.to_string()))
}

/// First of `keys` present in `v`, as text. Numbers are stringified.
pub(crate) fn field_str(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match v.get(*k)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First of `keys` present in `v`, as an integer. Numeric strings count.
pub(crate) fn field_i64(v: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| match v.get(*k)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<Decimal>().ok().and_then(|d| d.round().to_i64()),
        _ => None,
    })
}

pub(crate) fn field_decimal(v: &Value, keys: &[&str]) -> Option<Decimal> {
    field_str(v, keys).and_then(|s| s.trim().parse::<Decimal>().ok())
}

/// Vendors answer either a list or a single object.
pub(crate) fn as_list(data: Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_success_yields_data() {
        let data = envelope_data(json!({"success": true, "data": {"id": 7}})).unwrap();
        assert_eq!(data["id"], 7);
    }

    #[test]
    fn envelope_failure_carries_reason() {
        let err = envelope_data(json!({"success": false, "error": "Saldo tidak cukup"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Saldo tidak cukup");

        let err = envelope_data(json!({"foo": 1})).unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));
    }

    #[test]
    fn lenient_field_readers() {
        let v = json!({"id": 12, "price": "1500.75", "min": "100", "name": "Likes"});
        assert_eq!(field_str(&v, &["service", "id"]).as_deref(), Some("12"));
        assert_eq!(field_i64(&v, &["min"]), Some(100));
        assert_eq!(field_i64(&v, &["price"]), Some(1501));
        assert_eq!(
            field_decimal(&v, &["rate", "price"]),
            Some(Decimal::new(150075, 2))
        );
        assert_eq!(field_str(&v, &["missing"]), None);
    }

    #[test]
    fn gateway_status_classification() {
        let paid = GatewayStatus {
            transaction_status: "capture".into(),
            fraud_status: Some("accept".into()),
            payment_type: None,
        };
        assert!(paid.is_paid());

        let challenged = GatewayStatus {
            fraud_status: Some("challenge".into()),
            ..paid.clone()
        };
        assert!(!challenged.is_paid());
        assert!(!challenged.is_failed());

        let expired = GatewayStatus {
            transaction_status: "expire".into(),
            ..Default::default()
        };
        assert!(expired.is_failed());
    }

    #[test]
    fn single_object_is_a_list_of_one() {
        assert_eq!(as_list(json!({"a": 1})).len(), 1);
        assert_eq!(as_list(json!([1, 2])).len(), 2);
        assert!(as_list(Value::Null).is_empty());
    }
}
