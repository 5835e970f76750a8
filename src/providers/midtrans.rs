use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use sha2::{Digest, Sha512};
use tracing::debug;

use super::{
    Checkout, CheckoutRequest, GatewayNotification, GatewayStatus, PaymentGateway, ProviderError,
    ProviderResult, REQUEST_TIMEOUT, fetch_json, field_str,
};

const SNAP_SANDBOX: &str = "https://app.sandbox.midtrans.com/snap/v1/transactions";
const SNAP_PRODUCTION: &str = "https://app.midtrans.com/snap/v1/transactions";
const API_SANDBOX: &str = "https://api.sandbox.midtrans.com";
const API_PRODUCTION: &str = "https://api.midtrans.com";

/// Hex `SHA512(order_id + status_code + gross_amount + server_key)`, the
/// signature carried by every gateway notification.
pub fn notification_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct MidtransClient {
    client: Client,
    server_key: String,
    client_key: String,
    snap_url: &'static str,
    api_url: &'static str,
}

impl MidtransClient {
    pub fn new(
        server_key: impl Into<String>,
        client_key: impl Into<String>,
        production: bool,
    ) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self {
            client,
            server_key: server_key.into(),
            client_key: client_key.into(),
            snap_url: if production { SNAP_PRODUCTION } else { SNAP_SANDBOX },
            api_url: if production { API_PRODUCTION } else { API_SANDBOX },
        })
    }
}

#[async_trait]
impl PaymentGateway for MidtransClient {
    async fn create_checkout(&self, request: &CheckoutRequest) -> ProviderResult<Checkout> {
        let payload = json!({
            "transaction_details": {
                "order_id": request.order_id,
                "gross_amount": request.amount,
            },
            "customer_details": {
                "first_name": request.customer_name,
                "email": request.customer_email,
            },
        });
        debug!(order_id = %request.order_id, "requesting checkout token");
        let body = fetch_json(
            || {
                self.client
                    .post(self.snap_url)
                    .basic_auth(&self.server_key, Some(""))
                    .json(&payload)
            },
            false,
        )
        .await?;

        match (
            field_str(&body, &["token"]),
            field_str(&body, &["redirect_url"]),
        ) {
            (Some(token), Some(redirect_url)) => Ok(Checkout {
                token,
                redirect_url,
            }),
            _ => Err(ProviderError::Rejected(gateway_error(&body))),
        }
    }

    async fn transaction_status(&self, order_id: &str) -> ProviderResult<GatewayStatus> {
        let url = format!("{}/v2/{}/status", self.api_url, order_id);
        let body = fetch_json(
            || {
                self.client
                    .get(&url)
                    .basic_auth(&self.server_key, Some(""))
                    .header("Accept", "application/json")
            },
            true,
        )
        .await?;
        if body.get("transaction_status").is_none() {
            return Err(ProviderError::Rejected(gateway_error(&body)));
        }
        serde_json::from_value(body).map_err(|e| ProviderError::Parse(e.to_string()))
    }

    fn verify_notification(&self, notification: &GatewayNotification) -> bool {
        let expected = notification_signature(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &self.server_key,
        );
        expected.eq_ignore_ascii_case(notification.signature_key.trim())
    }

    fn client_key(&self) -> &str {
        &self.client_key
    }
}

fn gateway_error(body: &Value) -> String {
    body.get("error_messages")
        .and_then(Value::as_array)
        .and_then(|msgs| msgs.first())
        .and_then(Value::as_str)
        .or_else(|| body.get("status_message").and_then(Value::as_str))
        .unwrap_or("payment gateway rejected the request")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_sha512_hex_of_concatenation() {
        let sig = notification_signature("DEP-1", "200", "10000.00", "key");
        let mut hasher = Sha512::new();
        hasher.update(b"DEP-120010000.00key");
        assert_eq!(sig, hex::encode(hasher.finalize()));
        assert_eq!(sig.len(), 128);
    }

    #[test]
    fn notification_verification() {
        let gateway = MidtransClient::new("server-key", "client-key", false).unwrap();
        let mut notification = GatewayNotification {
            order_id: "DEP-1".into(),
            status_code: "200".into(),
            gross_amount: "10000.00".into(),
            signature_key: notification_signature("DEP-1", "200", "10000.00", "server-key"),
            ..Default::default()
        };
        assert!(gateway.verify_notification(&notification));

        notification.gross_amount = "99999.00".into();
        assert!(!gateway.verify_notification(&notification));
    }

    #[test]
    fn gateway_error_prefers_error_messages() {
        let body = json!({"error_messages": ["order_id has already been taken"]});
        assert_eq!(gateway_error(&body), "order_id has already been taken");
        assert_eq!(
            gateway_error(&json!({"status_message": "Not found"})),
            "Not found"
        );
    }
}
