//! SMM and PPOB reseller client.
//!
//! Both product lines share one API shape: `POST {base}/{line}` with a JSON
//! body `{key, action, ...}` answered by `{success, data, error}`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    PpobOrderRequest, PpobProvider, PpobService, PpobStatus, ProviderError, ProviderResult,
    REQUEST_TIMEOUT, SmmOrderRequest, SmmProvider, SmmService, SmmStatus, as_list,
    envelope_data, fetch_json, field_decimal, field_i64, field_str,
};

const SMM_LINE: &str = "sosmed";
const PPOB_LINE: &str = "ppob";

#[derive(Debug, Clone)]
pub struct JagoanClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl JagoanClient {
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

    async fn call(&self, line: &str, mut payload: Value, retry: bool) -> ProviderResult<Value> {
        let url = format!("{}/{}", self.base_url, line);
        payload["key"] = Value::String(self.api_key.clone());
        debug!(%url, action = %payload["action"], "reseller request");
        let body = fetch_json(|| self.client.post(&url).json(&payload), retry).await?;
        envelope_data(body)
    }
}

fn order_id_of(data: &Value) -> ProviderResult<String> {
    field_str(data, &["id", "order_id"])
        .ok_or_else(|| ProviderError::Parse("order response without id".to_string()))
}

fn parse_smm_service(v: &Value) -> Option<SmmService> {
    Some(SmmService {
        id: field_str(v, &["id", "service"])?,
        name: field_str(v, &["name"]).unwrap_or_default(),
        category: field_str(v, &["category"]).unwrap_or_default(),
        rate: field_decimal(v, &["price", "rate"])?,
        min: field_i64(v, &["min"]),
        max: field_i64(v, &["max"]),
    })
}

fn parse_ppob_service(v: &Value) -> Option<PpobService> {
    Some(PpobService {
        code: field_str(v, &["code", "id", "service"])?,
        name: field_str(v, &["name"]).unwrap_or_default(),
        category: field_str(v, &["category", "brand"]).unwrap_or_default(),
        price: field_i64(v, &["price"])?,
    })
}

#[async_trait]
impl SmmProvider for JagoanClient {
    async fn services(&self) -> ProviderResult<Vec<SmmService>> {
        let data = self
            .call(SMM_LINE, json!({"action": "services"}), true)
            .await?;
        Ok(as_list(data).iter().filter_map(parse_smm_service).collect())
    }

    async fn place_order(&self, request: &SmmOrderRequest) -> ProviderResult<String> {
        let mut payload = json!({
            "action": "order",
            "service": request.service_id,
            "target": request.target,
            "quantity": request.quantity,
        });
        if let Some(comments) = &request.custom_comments {
            payload["custom_comments"] = Value::String(comments.clone());
        }
        let data = self.call(SMM_LINE, payload, false).await?;
        order_id_of(&data)
    }

    async fn status(&self, provider_order_id: &str) -> ProviderResult<SmmStatus> {
        let data = self
            .call(
                SMM_LINE,
                json!({"action": "status", "order_id": provider_order_id}),
                true,
            )
            .await?;
        Ok(SmmStatus {
            status: field_str(&data, &["status"])
                .ok_or_else(|| ProviderError::Parse("status response without status".into()))?,
            start_count: field_i64(&data, &["start_count"]).unwrap_or(0),
            remains: field_i64(&data, &["remains"]).unwrap_or(0),
        })
    }

    async fn balance(&self) -> ProviderResult<i64> {
        let data = self
            .call(SMM_LINE, json!({"action": "profile"}), true)
            .await?;
        Ok(field_i64(&data, &["balance"]).unwrap_or(0))
    }
}

#[async_trait]
impl PpobProvider for JagoanClient {
    async fn services(&self) -> ProviderResult<Vec<PpobService>> {
        let data = self
            .call(PPOB_LINE, json!({"action": "services"}), true)
            .await?;
        Ok(as_list(data).iter().filter_map(parse_ppob_service).collect())
    }

    async fn place_order(&self, request: &PpobOrderRequest) -> ProviderResult<String> {
        let data = self
            .call(
                PPOB_LINE,
                json!({
                    "action": "order",
                    "service": request.service_code,
                    "target": request.target,
                }),
                false,
            )
            .await?;
        order_id_of(&data)
    }

    async fn status(&self, provider_order_id: &str) -> ProviderResult<PpobStatus> {
        let data = self
            .call(
                PPOB_LINE,
                json!({"action": "status", "order_id": provider_order_id}),
                true,
            )
            .await?;
        Ok(PpobStatus {
            status: field_str(&data, &["status"])
                .ok_or_else(|| ProviderError::Parse("status response without status".into()))?,
            sn: field_str(&data, &["sn"]).filter(|sn| !sn.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn smm_service_tolerates_string_numbers() {
        let svc = parse_smm_service(&json!({
            "id": 101, "name": "IG Likes", "category": "Instagram",
            "price": "12500", "min": "50", "max": 10000
        }))
        .unwrap();
        assert_eq!(svc.id, "101");
        assert_eq!(svc.rate, Decimal::from(12500));
        assert_eq!(svc.min, Some(50));
        assert_eq!(svc.max, Some(10000));
    }

    #[test]
    fn service_without_price_is_skipped() {
        assert!(parse_smm_service(&json!({"id": 1, "name": "x"})).is_none());
        assert!(parse_ppob_service(&json!({"code": "PLN20"})).is_none());
    }

    #[test]
    fn ppob_service_prefers_code() {
        let svc = parse_ppob_service(&json!({
            "code": "TSEL10", "id": 9, "name": "Telkomsel 10K", "price": 10750
        }))
        .unwrap();
        assert_eq!(svc.code, "TSEL10");
        assert_eq!(svc.price, 10750);
    }

    #[test]
    fn order_id_may_be_numeric() {
        assert_eq!(order_id_of(&json!({"id": 555})).unwrap(), "555");
        assert!(order_id_of(&json!({})).is_err());
    }
}
