#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use storefront::mailer::MemoryMailer;
use storefront::providers::mock::{MockGateway, MockNumbers, MockPpob, MockSmm};
use storefront::store::AdminUserUpdate;
use storefront::types::Role;
use storefront::{AppState, Config, MemoryStore, Store, init_router};
use tower::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub smm: Arc<MockSmm>,
    pub ppob: Arc<MockPpob>,
    pub numbers: Arc<MockNumbers>,
    pub mailer: Arc<MemoryMailer>,
}

/// A registered, signed-in account.
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub token: String,
}

impl TestApp {
    pub fn new() -> Self {
        let config = Config::for_tests();
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new(
            config.midtrans_server_key.clone(),
            config.midtrans_client_key.clone(),
        ));
        let smm = Arc::new(MockSmm::default());
        let ppob = Arc::new(MockPpob::default());
        let numbers = Arc::new(MockNumbers::default());
        let mailer = Arc::new(MemoryMailer::default());
        let state = AppState::new(
            config,
            store.clone(),
            gateway.clone(),
            smm.clone(),
            ppob.clone(),
            numbers.clone(),
            mailer.clone(),
        );
        Self {
            router: init_router(state.clone()),
            state,
            store,
            gateway,
            smm,
            ppob,
            numbers,
            mailer,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    pub async fn register(&self, username: &str, referral: Option<&str>) -> Account {
        let email = format!("{username}@mail.test");
        let (status, body) = self
            .post(
                "/auth/register",
                None,
                json!({
                    "fullname": format!("{username} tester"),
                    "username": username,
                    "email": email,
                    "password": "secret123",
                    "confirm_password": "secret123",
                    "referral": referral,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        let id: Uuid = body["data"]["id"].as_str().unwrap().parse().unwrap();
        let token = self.login(username).await;
        Account {
            id,
            username: username.to_string(),
            email,
            token,
        }
    }

    pub async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .post(
                "/auth/login",
                None,
                json!({"username": username, "password": "secret123"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }

    pub async fn fund(&self, account: &Account, amount: i64) {
        self.store.credit(account.id, amount).await.unwrap();
    }

    pub async fn balance(&self, account: &Account) -> i64 {
        self.store.user(account.id).await.unwrap().unwrap().balance
    }

    pub async fn set_role(&self, account: &Account, role: Role) {
        let user = self.store.user(account.id).await.unwrap().unwrap();
        self.store
            .admin_update_user(
                account.id,
                AdminUserUpdate {
                    balance: user.balance,
                    role,
                    password_hash: None,
                },
            )
            .await
            .unwrap();
    }
}
