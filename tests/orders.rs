mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use common::TestApp;
use serde_json::json;
use storefront::Store;
use storefront::providers::NumberAction;

#[tokio::test]
async fn smm_order_is_priced_from_the_catalogue() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    app.fund(&user, 5_000).await;

    let (status, body) = app
        .post(
            "/smm/order",
            Some(&user.token),
            json!({"service_id": "1", "target_link": "https://instagram.com/p/abc", "quantity": 150}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["price"], 1_500);
    assert_eq!(body["data"]["status"], "Pending");
    assert_eq!(app.balance(&user).await, 3_500);
    assert_eq!(app.smm.placed().len(), 1);

    let spender = app.store.user(user.id).await.unwrap().unwrap();
    assert_eq!(spender.monthly_spend, 1_500);
}

#[tokio::test]
async fn smm_quantity_outside_service_limits_is_rejected() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    app.fund(&user, 5_000).await;

    let (status, _) = app
        .post(
            "/smm/order",
            Some(&user.token),
            json!({"service_id": "1", "target_link": "https://x.test", "quantity": 50}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.smm.placed().is_empty());
    assert_eq!(app.balance(&user).await, 5_000);
}

#[tokio::test]
async fn refused_smm_order_returns_the_reservation() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    app.fund(&user, 5_000).await;
    app.smm.reject_orders(Some("Saldo provider tidak cukup"));

    let (status, body) = app
        .post(
            "/smm/order",
            Some(&user.token),
            json!({"service_id": "1", "target_link": "https://x.test", "quantity": 100}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "PROVIDER_FAILURE");
    assert_eq!(app.balance(&user).await, 5_000);
    assert!(app.store.smm_orders_for_user(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn insufficient_balance_never_reaches_the_provider() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    app.fund(&user, 999).await;

    let (status, body) = app
        .post(
            "/smm/order",
            Some(&user.token),
            json!({"service_id": "1", "target_link": "https://x.test", "quantity": 100}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INSUFFICIENT_BALANCE");
    assert!(app.smm.placed().is_empty());
    assert_eq!(app.balance(&user).await, 999);
}

#[tokio::test]
async fn canceled_smm_order_is_refunded_exactly_once() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    app.fund(&user, 1_000).await;
    let (status, body) = app
        .post(
            "/smm/order",
            Some(&user.token),
            json!({"service_id": "1", "target_link": "https://x.test", "quantity": 100}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let provider_id = body["data"]["provider_order_id"].as_str().unwrap().to_string();
    assert_eq!(app.balance(&user).await, 0);

    app.smm.set_status(&provider_id, "Canceled", 0, 100);
    let (status, body) = app.get("/smm/history", Some(&user.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["status"], "Canceled");
    assert_eq!(body["data"][0]["refunded"], true);
    assert_eq!(app.balance(&user).await, 1_000);

    app.get("/smm/history", Some(&user.token)).await;
    assert_eq!(app.balance(&user).await, 1_000);
}

#[tokio::test]
async fn ppob_history_refreshes_serial_number() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    app.fund(&user, 25_000).await;

    let (status, body) = app
        .post(
            "/ppob/order",
            Some(&user.token),
            json!({"service_code": "PLN20", "target_number": "5123456789"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["price"], 20_500);
    let provider_id = body["data"]["provider_order_id"].as_str().unwrap().to_string();

    app.ppob.set_status(&provider_id, "Success", Some("1234-5678-9012"));
    let (_, body) = app.get("/ppob/history", Some(&user.token)).await;
    assert_eq!(body["data"][0]["status"], "Success");
    assert_eq!(body["data"][0]["sn"], "1234-5678-9012");
    assert_eq!(app.balance(&user).await, 4_500);
}

#[tokio::test]
async fn unknown_ppob_code_is_not_found() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    app.fund(&user, 25_000).await;
    let (status, _) = app
        .post(
            "/ppob/order",
            Some(&user.token),
            json!({"service_code": "NOPE", "target_number": "0812"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.balance(&user).await, 25_000);
}

fn number_order(price: i64) -> serde_json::Value {
    json!({"number_id": "42", "provider_id": "7", "service_id": "wa", "price": price})
}

#[tokio::test]
async fn stale_number_quote_is_rejected() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    app.fund(&user, 10_000).await;

    let (status, body) = app
        .post("/nokos/order", Some(&user.token), number_order(3_000))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "PRICE_CHANGED");
    assert_eq!(app.balance(&user).await, 10_000);
}

#[tokio::test]
async fn canceled_number_is_refunded_once() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    app.fund(&user, 10_000).await;

    let (status, body) = app
        .post("/nokos/order", Some(&user.token), number_order(3_500))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();
    assert_eq!(app.balance(&user).await, 6_500);

    let uri = format!("/nokos/status/{order_id}");
    let (status, body) = app
        .post(&uri, Some(&user.token), json!({"action": "cancel"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "canceled");
    assert_eq!(body["data"]["refunded"], true);
    assert_eq!(app.balance(&user).await, 10_000);

    app.post(&uri, Some(&user.token), json!({"action": "cancel"}))
        .await;
    app.numbers.set_status(&order_id, "canceled", "-");
    app.get(&uri, Some(&user.token)).await;
    assert_eq!(app.balance(&user).await, 10_000);
    assert_eq!(
        app.numbers.actions(),
        vec![
            (order_id.clone(), NumberAction::Cancel),
            (order_id, NumberAction::Cancel)
        ]
    );
}

#[tokio::test]
async fn number_status_pulls_the_otp() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    let other = app.register("ani", None).await;
    app.fund(&user, 10_000).await;
    let (_, body) = app
        .post("/nokos/order", Some(&user.token), number_order(3_500))
        .await;
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();
    let uri = format!("/nokos/status/{order_id}");

    let (status, _) = app.get(&uri, Some(&other.token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.numbers.set_status(&order_id, "received", "482913");
    let (status, body) = app.get(&uri, Some(&user.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["otp_code"], "482913");
    assert_eq!(body["data"]["refunded"], false);
}

#[tokio::test]
async fn refused_rental_returns_the_reservation() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    app.fund(&user, 10_000).await;
    app.numbers.reject_rentals(Some("stok habis"));

    let (status, _) = app
        .post("/nokos/order", Some(&user.token), number_order(3_500))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(app.balance(&user).await, 10_000);
}

#[tokio::test]
async fn absurd_rental_duration_still_records_the_order() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    app.fund(&user, 10_000).await;
    app.numbers.set_rental_minutes(i64::MAX);

    let (status, body) = app
        .post("/nokos/order", Some(&user.token), number_order(3_500))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(app.balance(&user).await, 6_500);

    let expires_at: DateTime<Utc> = body["data"]["expires_at"].as_str().unwrap().parse().unwrap();
    assert!(expires_at <= Utc::now() + Duration::hours(24));
    assert!(expires_at > Utc::now());

    let (status, body) = app.get("/nokos/history", Some(&user.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn rental_that_cannot_be_recorded_is_reported() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    app.fund(&user, 10_000).await;

    let (status, _) = app
        .post("/nokos/order", Some(&user.token), number_order(3_500))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // The vendor hands out an order id that is already on file.
    app.numbers.set_next_rental_id(1);
    let (status, body) = app
        .post("/nokos/order", Some(&user.token), number_order(3_500))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (_, body) = app.get("/nokos/history", Some(&user.token)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}
