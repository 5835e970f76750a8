use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{
    NumberAction, NumberProvider, NumberRental, NumberStatus, ProviderError, ProviderResult,
    REQUEST_TIMEOUT, envelope_data, fetch_json, field_i64, field_str,
};

/// Virtual number vendor. Catalogue and rental live under `/v2`, order
/// status under `/v1`; every call authenticates with an `x-apikey` header.
#[derive(Debug, Clone)]
pub struct RumahOtpClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RumahOtpClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)], retry: bool) -> ProviderResult<Value> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, "number vendor request");
        fetch_json(
            || {
                self.client
                    .get(&url)
                    .header("x-apikey", &self.api_key)
                    .header("Accept", "application/json")
                    .query(query)
            },
            retry,
        )
        .await
    }
}

fn parse_rental(data: &Value) -> ProviderResult<NumberRental> {
    let missing = |field: &str| ProviderError::Parse(format!("rental response without {field}"));
    Ok(NumberRental {
        order_id: field_str(data, &["order_id", "id"]).ok_or_else(|| missing("order_id"))?,
        phone_number: field_str(data, &["phone_number", "number"])
            .ok_or_else(|| missing("phone_number"))?,
        service: field_str(data, &["service"]).unwrap_or_default(),
        country: field_str(data, &["country"]).unwrap_or_default(),
        expires_in_minute: field_i64(data, &["expires_in_minute"]).unwrap_or(20),
    })
}

#[async_trait]
impl NumberProvider for RumahOtpClient {
    async fn services(&self) -> ProviderResult<Value> {
        envelope_data(self.get("v2/services", &[], true).await?)
    }

    async fn countries(&self, service_id: &str) -> ProviderResult<Value> {
        envelope_data(
            self.get("v2/countries", &[("service_id", service_id)], true)
                .await?,
        )
    }

    async fn operators(&self, country: &str, provider_id: &str) -> ProviderResult<Value> {
        envelope_data(
            self.get(
                "v2/operators",
                &[("country", country), ("provider_id", provider_id)],
                true,
            )
            .await?,
        )
    }

    async fn rent(
        &self,
        number_id: &str,
        provider_id: &str,
        operator_id: &str,
    ) -> ProviderResult<NumberRental> {
        let body = self
            .get(
                "v2/orders",
                &[
                    ("number_id", number_id),
                    ("provider_id", provider_id),
                    ("operator_id", operator_id),
                ],
                false,
            )
            .await?;
        parse_rental(&envelope_data(body)?)
    }

    async fn status(&self, order_id: &str) -> ProviderResult<NumberStatus> {
        let data = envelope_data(
            self.get("v1/orders/get_status", &[("order_id", order_id)], true)
                .await?,
        )?;
        Ok(NumberStatus {
            status: field_str(&data, &["status"])
                .ok_or_else(|| ProviderError::Parse("status response without status".into()))?,
            otp_code: field_str(&data, &["otp_code"]).unwrap_or_else(|| "-".to_string()),
        })
    }

    async fn set_status(&self, order_id: &str, action: NumberAction) -> ProviderResult<()> {
        let body = self
            .get(
                "v1/orders/set_status",
                &[("order_id", order_id), ("status", action.as_str())],
                false,
            )
            .await?;
        envelope_data(body).map(|_| ())
    }
}
