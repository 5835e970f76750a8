mod common;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::TestApp;
use serde_json::json;
use storefront::Store;
use storefront::auth::totp;
use storefront::types::Role;

#[tokio::test]
async fn registration_rejects_mismatched_passwords_and_duplicates() {
    let app = TestApp::new();
    let (status, _) = app
        .post(
            "/auth/register",
            None,
            json!({"fullname": "Budi", "username": "budi", "email": "budi@mail.test",
                   "password": "a", "confirm_password": "b"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.register("budi", None).await;
    let (status, body) = app
        .post(
            "/auth/register",
            None,
            json!({"fullname": "Budi", "username": "budi", "email": "other@mail.test",
                   "password": "a", "confirm_password": "a"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn unknown_referral_code_is_ignored() {
    let app = TestApp::new();
    let user = app.register("budi", Some("REF-NOPE00")).await;
    let stored = app.store.user(user.id).await.unwrap().unwrap();
    assert!(stored.referred_by.is_none());
    assert!(stored.referral_code.starts_with("REF-"));
}

#[tokio::test]
async fn login_checks_password_role_and_ban() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;

    let (status, body) = app
        .post("/auth/login", None, json!({"username": "budi", "password": "wrong"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = app
        .post(
            "/auth/login",
            None,
            json!({"username": "budi", "password": "secret123", "role": "admin"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.set_role(&user, Role::Banned).await;
    let (status, _) = app
        .post("/auth/login", None, json!({"username": "budi", "password": "secret123"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Sessions issued before the ban stop working too.
    let (status, _) = app.get("/profile", Some(&user.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = TestApp::new();
    let (status, body) = app.get("/dashboard", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["request_id"].is_string());

    let (status, _) = app.get("/dashboard", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn two_factor_gates_login_once_enabled() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;

    let (status, body) = app
        .post("/profile/2fa/setup", Some(&user.token), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let secret = body["data"]["secret"].as_str().unwrap().to_string();
    let uri = body["data"]["otpauth_uri"].as_str().unwrap();
    assert!(uri.starts_with("otpauth://totp/"));
    assert!(uri.contains(":budi%40mail.test?"), "{uri}");
    assert!(!uri.contains("algorithm="), "{uri}");

    let (status, _) = app
        .post("/profile/2fa/enable", Some(&user.token), json!({"token": "000000x"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let code = totp::code_at(&secret, Utc::now().timestamp()).unwrap();
    let (status, body) = app
        .post("/profile/2fa/enable", Some(&user.token), json!({"token": code}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app
        .post("/auth/login", None, json!({"username": "budi", "password": "secret123"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TWO_FACTOR_REQUIRED");

    let code = totp::code_at(&secret, Utc::now().timestamp()).unwrap();
    let (status, body) = app
        .post(
            "/auth/login",
            None,
            json!({"username": "budi", "password": "secret123", "token": code}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["user"]["two_factor_enabled"], true);
    assert!(body["data"]["user"].get("two_factor_secret").is_none());
}

#[tokio::test]
async fn email_verification_round() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;

    let (status, _) = app
        .post("/profile/verify/request", Some(&user.token), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let code = app
        .store
        .user(user.id)
        .await
        .unwrap()
        .unwrap()
        .verification_code
        .unwrap();
    let mails = app.mailer.sent_to(&user.email);
    assert_eq!(mails.len(), 1);
    assert!(mails[0].html.contains(&code));

    let (status, _) = app
        .post("/profile/verify/check", Some(&user.token), json!({"code": "000000"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post("/profile/verify/check", Some(&user.token), json!({"code": code}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_verified"], true);
}

#[tokio::test]
async fn profile_update_and_affiliate_link() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;

    let (status, body) = app
        .call(
            Method::PUT,
            "/profile",
            Some(&user.token),
            Some(json!({"fullname": "Budi Santoso", "username": "budis", "profile_pic": "https://img.test/b.png"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["username"], "budis");
    assert_eq!(body["data"]["profile_pic"], "https://img.test/b.png");

    let (_, body) = app.get("/affiliate", Some(&user.token)).await;
    let code = body["data"]["referral_code"].as_str().unwrap();
    assert_eq!(
        body["data"]["referral_link"],
        format!("https://shop.test/auth/register?referral={code}")
    );
}

#[tokio::test]
async fn daily_bonus_has_a_cooldown() {
    let app = TestApp::new();
    let user = app.register("budi", None).await;

    let (status, body) = app.post("/bonus/daily", Some(&user.token), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let amount = body["data"]["amount"].as_i64().unwrap();
    assert!((100..=500).contains(&amount));
    assert_eq!(app.balance(&user).await, amount);

    let (status, body) = app.post("/bonus/daily", Some(&user.token), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "TOO_EARLY");
    assert_eq!(app.balance(&user).await, amount);

    let (_, body) = app.get("/dashboard", Some(&user.token)).await;
    assert!(body["data"]["daily_cooldown_ms"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn balance_voucher_redeems_once_per_user() {
    let app = TestApp::new();
    let admin = app.register("admin", None).await;
    app.set_role(&admin, Role::Admin).await;
    let (status, _) = app
        .post(
            "/admin/vouchers",
            Some(&admin.token),
            json!({"code": "GRATIS5K", "kind": "balance", "value": 5_000, "quota": 10, "expires_in_days": 1}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let user = app.register("budi", None).await;
    let (status, body) = app
        .post("/bonus/redeem", Some(&user.token), json!({"code": "gratis5k"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["balance"], 5_000);

    let (status, body) = app
        .post("/bonus/redeem", Some(&user.token), json!({"code": "GRATIS5K"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VOUCHER_INVALID");
    assert_eq!(app.balance(&user).await, 5_000);
}

#[tokio::test]
async fn leaderboard_orders_by_balance() {
    let app = TestApp::new();
    let rich = app.register("rich", None).await;
    let poor = app.register("poor", None).await;
    app.fund(&rich, 90_000).await;
    app.fund(&poor, 10).await;

    let (status, body) = app.get("/bonus/leaderboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["username"], "rich");
    assert_eq!(body["data"][1]["username"], "poor");
}
