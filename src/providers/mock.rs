//! In-process vendor doubles. The integration tests drive the whole router
//! against these; they can also back a local run without vendor keys.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use super::{
    Checkout, CheckoutRequest, GatewayNotification, GatewayStatus, NumberAction, NumberProvider,
    NumberRental, NumberStatus, PaymentGateway, PpobOrderRequest, PpobProvider, PpobService,
    PpobStatus, ProviderError, ProviderResult, SmmOrderRequest, SmmProvider, SmmService,
    SmmStatus, notification_signature,
};

#[derive(Debug)]
pub struct MockGateway {
    server_key: String,
    client_key: String,
    statuses: Mutex<HashMap<String, GatewayStatus>>,
    checkouts: Mutex<Vec<CheckoutRequest>>,
    reject_checkout: Mutex<Option<String>>,
}

impl MockGateway {
    pub fn new(server_key: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self {
            server_key: server_key.into(),
            client_key: client_key.into(),
            statuses: Mutex::default(),
            checkouts: Mutex::default(),
            reject_checkout: Mutex::default(),
        }
    }

    /// What the status API will report for `order_id`.
    pub fn set_status(&self, order_id: &str, transaction_status: &str) {
        self.statuses.lock().insert(
            order_id.to_string(),
            GatewayStatus {
                transaction_status: transaction_status.to_string(),
                fraud_status: Some("accept".to_string()),
                payment_type: Some("bank_transfer".to_string()),
            },
        );
    }

    pub fn reject_checkouts(&self, reason: Option<&str>) {
        *self.reject_checkout.lock() = reason.map(str::to_string);
    }

    pub fn checkouts(&self) -> Vec<CheckoutRequest> {
        self.checkouts.lock().clone()
    }

    /// A notification signed with this gateway's server key.
    pub fn signed_notification(&self, order_id: &str, gross_amount: &str) -> GatewayNotification {
        GatewayNotification {
            order_id: order_id.to_string(),
            status_code: "200".to_string(),
            gross_amount: gross_amount.to_string(),
            signature_key: notification_signature(order_id, "200", gross_amount, &self.server_key),
            transaction_status: Some("settlement".to_string()),
            payment_type: Some("bank_transfer".to_string()),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout(&self, request: &CheckoutRequest) -> ProviderResult<Checkout> {
        if let Some(reason) = self.reject_checkout.lock().clone() {
            return Err(ProviderError::Rejected(reason));
        }
        self.checkouts.lock().push(request.clone());
        Ok(Checkout {
            token: format!("snap-{}", request.order_id),
            redirect_url: format!("https://checkout.test/{}", request.order_id),
        })
    }

    async fn transaction_status(&self, order_id: &str) -> ProviderResult<GatewayStatus> {
        self.statuses
            .lock()
            .get(order_id)
            .cloned()
            .ok_or_else(|| ProviderError::Rejected("Transaction doesn't exist.".to_string()))
    }

    fn verify_notification(&self, notification: &GatewayNotification) -> bool {
        notification_signature(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &self.server_key,
        ) == notification.signature_key
    }

    fn client_key(&self) -> &str {
        &self.client_key
    }
}

#[derive(Debug)]
pub struct MockSmm {
    services: Mutex<Vec<SmmService>>,
    statuses: Mutex<HashMap<String, SmmStatus>>,
    placed: Mutex<Vec<SmmOrderRequest>>,
    reject: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl Default for MockSmm {
    fn default() -> Self {
        Self::with_services(vec![SmmService {
            id: "1".to_string(),
            name: "Instagram Likes".to_string(),
            category: "Instagram".to_string(),
            rate: Decimal::from(10_000),
            min: Some(100),
            max: Some(10_000),
        }])
    }
}

impl MockSmm {
    pub fn with_services(services: Vec<SmmService>) -> Self {
        Self {
            services: Mutex::new(services),
            statuses: Mutex::default(),
            placed: Mutex::default(),
            reject: Mutex::default(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Makes every following order fail with `reason`, or succeed again.
    pub fn reject_orders(&self, reason: Option<&str>) {
        *self.reject.lock() = reason.map(str::to_string);
    }

    pub fn set_status(&self, provider_order_id: &str, status: &str, start_count: i64, remains: i64) {
        self.statuses.lock().insert(
            provider_order_id.to_string(),
            SmmStatus {
                status: status.to_string(),
                start_count,
                remains,
            },
        );
    }

    pub fn placed(&self) -> Vec<SmmOrderRequest> {
        self.placed.lock().clone()
    }
}

#[async_trait]
impl SmmProvider for MockSmm {
    async fn services(&self) -> ProviderResult<Vec<SmmService>> {
        Ok(self.services.lock().clone())
    }

    async fn place_order(&self, request: &SmmOrderRequest) -> ProviderResult<String> {
        if let Some(reason) = self.reject.lock().clone() {
            return Err(ProviderError::Rejected(reason));
        }
        self.placed.lock().push(request.clone());
        Ok(format!("SMM-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn status(&self, provider_order_id: &str) -> ProviderResult<SmmStatus> {
        self.statuses
            .lock()
            .get(provider_order_id)
            .cloned()
            .ok_or_else(|| ProviderError::Rejected("order not found".to_string()))
    }

    async fn balance(&self) -> ProviderResult<i64> {
        Ok(250_000)
    }
}

#[derive(Debug)]
pub struct MockPpob {
    services: Mutex<Vec<PpobService>>,
    statuses: Mutex<HashMap<String, PpobStatus>>,
    reject: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl Default for MockPpob {
    fn default() -> Self {
        Self {
            services: Mutex::new(vec![PpobService {
                code: "PLN20".to_string(),
                name: "Token PLN 20.000".to_string(),
                category: "PLN".to_string(),
                price: 20_500,
            }]),
            statuses: Mutex::default(),
            reject: Mutex::default(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl MockPpob {
    pub fn reject_orders(&self, reason: Option<&str>) {
        *self.reject.lock() = reason.map(str::to_string);
    }

    pub fn set_status(&self, provider_order_id: &str, status: &str, sn: Option<&str>) {
        self.statuses.lock().insert(
            provider_order_id.to_string(),
            PpobStatus {
                status: status.to_string(),
                sn: sn.map(str::to_string),
            },
        );
    }
}

#[async_trait]
impl PpobProvider for MockPpob {
    async fn services(&self) -> ProviderResult<Vec<PpobService>> {
        Ok(self.services.lock().clone())
    }

    async fn place_order(&self, _request: &PpobOrderRequest) -> ProviderResult<String> {
        if let Some(reason) = self.reject.lock().clone() {
            return Err(ProviderError::Rejected(reason));
        }
        Ok(format!("PPOB-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn status(&self, provider_order_id: &str) -> ProviderResult<PpobStatus> {
        self.statuses
            .lock()
            .get(provider_order_id)
            .cloned()
            .ok_or_else(|| ProviderError::Rejected("order not found".to_string()))
    }
}

/// Offers one number (`number_id` 42) for 3500 until told otherwise.
#[derive(Debug)]
pub struct MockNumbers {
    countries: Mutex<Value>,
    statuses: Mutex<HashMap<String, NumberStatus>>,
    actions: Mutex<Vec<(String, NumberAction)>>,
    reject: Mutex<Option<String>>,
    rental_minutes: Mutex<i64>,
    next_id: AtomicU64,
}

impl Default for MockNumbers {
    fn default() -> Self {
        Self {
            countries: Mutex::new(json!([{
                "name": "Indonesia",
                "pricelist": [
                    {"number_id": 42, "provider_id": "7", "price": 3500, "stock": 12}
                ]
            }])),
            statuses: Mutex::default(),
            actions: Mutex::default(),
            reject: Mutex::default(),
            rental_minutes: Mutex::new(20),
            next_id: AtomicU64::new(1),
        }
    }
}

impl MockNumbers {
    /// Restarts the `RO-n` rental id sequence at `n`.
    pub fn set_next_rental_id(&self, n: u64) {
        self.next_id.store(n, Ordering::SeqCst);
    }

    /// Rental duration quoted by the next `rent` calls.
    pub fn set_rental_minutes(&self, minutes: i64) {
        *self.rental_minutes.lock() = minutes;
    }

    pub fn set_countries(&self, countries: Value) {
        *self.countries.lock() = countries;
    }

    pub fn reject_rentals(&self, reason: Option<&str>) {
        *self.reject.lock() = reason.map(str::to_string);
    }

    pub fn set_status(&self, order_id: &str, status: &str, otp_code: &str) {
        self.statuses.lock().insert(
            order_id.to_string(),
            NumberStatus {
                status: status.to_string(),
                otp_code: otp_code.to_string(),
            },
        );
    }

    pub fn actions(&self) -> Vec<(String, NumberAction)> {
        self.actions.lock().clone()
    }
}

#[async_trait]
impl NumberProvider for MockNumbers {
    async fn services(&self) -> ProviderResult<Value> {
        Ok(json!([{"service_code": "wa", "service_name": "WhatsApp"}]))
    }

    async fn countries(&self, _service_id: &str) -> ProviderResult<Value> {
        Ok(self.countries.lock().clone())
    }

    async fn operators(&self, _country: &str, _provider_id: &str) -> ProviderResult<Value> {
        Ok(json!([{"id": 1, "name": "any"}]))
    }

    async fn rent(
        &self,
        _number_id: &str,
        _provider_id: &str,
        _operator_id: &str,
    ) -> ProviderResult<NumberRental> {
        if let Some(reason) = self.reject.lock().clone() {
            return Err(ProviderError::Rejected(reason));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(NumberRental {
            order_id: format!("RO-{n}"),
            phone_number: format!("+62812000{n:04}"),
            service: "WhatsApp".to_string(),
            country: "Indonesia".to_string(),
            expires_in_minute: *self.rental_minutes.lock(),
        })
    }

    async fn status(&self, order_id: &str) -> ProviderResult<NumberStatus> {
        Ok(self
            .statuses
            .lock()
            .get(order_id)
            .cloned()
            .unwrap_or_else(|| NumberStatus {
                status: "waiting".to_string(),
                otp_code: "-".to_string(),
            }))
    }

    async fn set_status(&self, order_id: &str, action: NumberAction) -> ProviderResult<()> {
        self.actions.lock().push((order_id.to_string(), action));
        Ok(())
    }
}
