mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{Account, TestApp};
use serde_json::json;
use storefront::Store;
use storefront::services::deposits::{self, NotificationOutcome};
use storefront::types::{DepositStatus, Rank};

async fn create_deposit(app: &TestApp, token: &str, amount: i64) -> String {
    let (status, body) = app
        .post("/deposit/create", Some(token), json!({"amount": amount}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["client_key"], "client-key");
    body["data"]["order_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn deposit_below_minimum_is_rejected() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;

    let (status, body) = app
        .post("/deposit/create", Some(&user.token), json!({"amount": 9_999}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_AMOUNT");
    assert!(app.gateway.checkouts().is_empty());
}

#[tokio::test]
async fn settlement_credits_once_and_pays_referrer() {
    let app = TestApp::new();
    let referrer = app.register("rina", None).await;
    let code = app
        .store
        .user(referrer.id)
        .await
        .unwrap()
        .unwrap()
        .referral_code;
    let user = app.register("budi", Some(&code)).await;

    let order_id = create_deposit(&app, &user.token, 1_000_000).await;
    app.gateway.set_status(&order_id, "settlement");
    let notification = serde_json::to_value(app.gateway.signed_notification(&order_id, "1000000.00")).unwrap();

    let (status, body) = app
        .post("/deposit/notification", None, notification.clone())
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"], "settled");

    // Gateways retry deliveries; the second one must change nothing.
    let (status, body) = app.post("/deposit/notification", None, notification).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "already_settled");

    let depositor = app.store.user(user.id).await.unwrap().unwrap();
    assert_eq!(depositor.balance, 1_000_000);
    assert_eq!(depositor.total_deposit, 1_000_000);
    assert_eq!(depositor.rank, Rank::Silver);

    let referrer = app.store.user(referrer.id).await.unwrap().unwrap();
    assert_eq!(referrer.balance, 50_000);
    assert_eq!(referrer.referral_earnings, 50_000);

    let deposit = app
        .store
        .deposit_by_order_id(&order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deposit.status, DepositStatus::Success);
    assert_eq!(deposit.payment_type.as_deref(), Some("bank_transfer"));
}

#[tokio::test]
async fn forged_notification_is_refused() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    let order_id = create_deposit(&app, &user.token, 20_000).await;
    app.gateway.set_status(&order_id, "settlement");

    let mut notification = app.gateway.signed_notification(&order_id, "20000.00");
    notification.gross_amount = "2000000.00".to_string();
    let (status, body) = app
        .post(
            "/deposit/notification",
            None,
            serde_json::to_value(notification).unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_SIGNATURE");
    assert_eq!(app.balance(&user).await, 0);
}

#[tokio::test]
async fn expired_payment_marks_deposit_failed() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    let order_id = create_deposit(&app, &user.token, 20_000).await;
    app.gateway.set_status(&order_id, "expire");

    let notification = serde_json::to_value(app.gateway.signed_notification(&order_id, "20000.00")).unwrap();
    let (status, body) = app.post("/deposit/notification", None, notification).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "failed");

    let deposit = app
        .store
        .deposit_by_order_id(&order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deposit.status, DepositStatus::Failed);
    assert_eq!(app.balance(&user).await, 0);
}

#[tokio::test]
async fn unknown_order_is_acknowledged() {
    let app = TestApp::new();
    let notification = serde_json::to_value(app.gateway.signed_notification("DEP-0-1", "10000.00")).unwrap();
    let (status, body) = app.post("/deposit/notification", None, notification).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "unknown_order");
}

async fn referral_pair(app: &TestApp) -> (Account, Account) {
    let referrer = app.register("rina", None).await;
    let code = app
        .store
        .user(referrer.id)
        .await
        .unwrap()
        .unwrap()
        .referral_code;
    let user = app.register("budi", Some(&code)).await;
    (referrer, user)
}

#[tokio::test]
async fn callback_claiming_settlement_is_checked_against_the_gateway() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;
    let order_id = create_deposit(&app, &user.token, 50_000).await;
    // The body says settlement, the status API still says pending.
    app.gateway.set_status(&order_id, "pending");

    let notification = serde_json::to_value(app.gateway.signed_notification(&order_id, "50000.00")).unwrap();
    let (status, body) = app.post("/deposit/notification", None, notification).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "recorded");

    assert_eq!(app.balance(&user).await, 0);
    let deposit = app
        .store
        .deposit_by_order_id(&order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deposit.status, DepositStatus::Pending);
}

#[tokio::test]
async fn late_settlement_of_failed_deposit_credits_once() {
    let app = TestApp::new();
    let (referrer, user) = referral_pair(&app).await;
    let order_id = create_deposit(&app, &user.token, 100_000).await;
    let notification = serde_json::to_value(app.gateway.signed_notification(&order_id, "100000.00")).unwrap();

    app.gateway.set_status(&order_id, "expire");
    let (_, body) = app.post("/deposit/notification", None, notification.clone()).await;
    assert_eq!(body["data"], "failed");
    assert_eq!(app.balance(&user).await, 0);

    app.gateway.set_status(&order_id, "settlement");
    let (_, body) = app.post("/deposit/notification", None, notification.clone()).await;
    assert_eq!(body["data"], "settled");
    let (_, body) = app.post("/deposit/notification", None, notification).await;
    assert_eq!(body["data"], "already_settled");

    assert_eq!(app.balance(&user).await, 100_000);
    assert_eq!(app.balance(&referrer).await, 5_000);
    let deposit = app
        .store
        .deposit_by_order_id(&order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deposit.status, DepositStatus::Success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_notifications_settle_once() {
    let app = TestApp::new();
    let (referrer, user) = referral_pair(&app).await;
    let order_id = create_deposit(&app, &user.token, 200_000).await;
    app.gateway.set_status(&order_id, "settlement");
    let notification = app.gateway.signed_notification(&order_id, "200000.00");

    let deliveries: Vec<_> = (0..8)
        .map(|_| {
            let state = app.state.clone();
            let notification = notification.clone();
            tokio::spawn(async move {
                deposits::handle_notification(&state, &notification, Utc::now()).await
            })
        })
        .collect();
    let mut settled = 0;
    for delivery in deliveries {
        match delivery.await.unwrap().unwrap() {
            NotificationOutcome::Settled => settled += 1,
            outcome => assert_eq!(outcome, NotificationOutcome::AlreadySettled),
        }
    }

    assert_eq!(settled, 1);
    assert_eq!(app.balance(&user).await, 200_000);
    let referrer = app.store.user(referrer.id).await.unwrap().unwrap();
    assert_eq!(referrer.balance, 10_000);
    assert_eq!(referrer.referral_earnings, 10_000);
}
