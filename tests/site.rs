mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use common::{Account, TestApp};
use serde_json::json;
use storefront::types::Role;

async fn admin(app: &TestApp) -> Account {
    let admin = app.register("admin", None).await;
    app.set_role(&admin, Role::Admin).await;
    admin
}

#[tokio::test]
async fn health_answers_ok() {
    let app = TestApp::new();
    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn maintenance_blocks_everyone_but_admins() {
    let app = TestApp::new();
    let admin = admin(&app).await;
    let member = app.register("budi", None).await;

    let (status, body) = app
        .call(
            Method::PUT,
            "/admin/settings",
            Some(&admin.token),
            Some(json!({
                "website_title": "Toko Digital",
                "website_logo": "https://img.test/logo.png",
                "website_favicon": "https://img.test/fav.ico",
                "is_maintenance": true,
                "maintenance_message": "Sedang perbaikan",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app.get("/dashboard", Some(&member.token)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "MAINTENANCE");
    assert_eq!(body["error"], "Sedang perbaikan");

    let (status, _) = app.get("/dashboard", Some(&admin.token)).await;
    assert_eq!(status, StatusCode::OK);

    // Signing in and gateway callbacks keep working.
    app.login("budi").await;
    let (status, _) = app
        .post(
            "/deposit/notification",
            None,
            serde_json::to_value(app.gateway.signed_notification("DEP-1-1", "10000.00")).unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/site", None).await;
    assert_eq!(body["data"]["website_title"], "Toko Digital");
}

#[tokio::test]
async fn admin_routes_refuse_members() {
    let app = TestApp::new();
    let member = app.register("budi", None).await;
    let (status, body) = app.get("/admin/stats", Some(&member.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn admin_stats_and_user_edit() {
    let app = TestApp::new();
    let admin = admin(&app).await;
    let member = app.register("budi", None).await;

    let (status, body) = app.get("/admin/stats", Some(&admin.token)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["users"], 2);
    assert_eq!(body["data"]["provider_balance"], 250_000);
    assert_eq!(body["data"]["revenue"], 0);

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/admin/users/{}", member.id),
            Some(&admin.token),
            Some(json!({"balance": 75_000, "role": "seller", "password": "newpass99"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["role"], "seller");
    assert_eq!(app.balance(&member).await, 75_000);

    let (status, _) = app
        .post(
            "/auth/login",
            None,
            json!({"username": "budi", "password": "newpass99"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn broadcast_mails_every_account_in_background() {
    let app = TestApp::new();
    let admin = admin(&app).await;
    app.register("budi", None).await;
    app.register("ani", None).await;

    let (status, body) = app
        .post(
            "/admin/broadcast",
            Some(&admin.token),
            json!({"subject": "Promo", "message": "<p>Diskon 50%</p>"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["recipients"], 3);

    for _ in 0..50 {
        if app.mailer.sent().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(app.mailer.sent().len(), 3);
}

#[tokio::test]
async fn news_lifecycle_and_audience() {
    let app = TestApp::new();
    let admin = admin(&app).await;
    let member = app.register("budi", None).await;

    let (status, body) = app
        .post(
            "/admin/news",
            Some(&admin.token),
            json!({"title": "Info Seller", "content": "Khusus seller", "audience": "seller"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["author"], "admin tester");
    let slug = body["data"]["slug"].as_str().unwrap().to_string();
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert!(slug.starts_with("info-seller-"));

    let (status, body) = app.get(&format!("/news/{slug}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["content"], "Khusus seller");

    let (_, body) = app.get("/information", Some(&member.token)).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = app
        .call(Method::DELETE, &format!("/admin/news/{id}"), Some(&admin.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/news/{slug}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_tracks_unread_messages() {
    let app = TestApp::new();
    let budi = app.register("budi", None).await;
    let ani = app.register("ani", None).await;

    let (status, _) = app
        .post(&format!("/chat/{}", budi.id), Some(&budi.token), json!({"message": "halo"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for text in ["halo kak", "produknya ready?"] {
        let (status, body) = app
            .post(&format!("/chat/{}", ani.id), Some(&budi.token), json!({"message": text}))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    let (_, body) = app.get("/chat", Some(&ani.token)).await;
    assert_eq!(body["data"][0]["partner"]["username"], "budi");
    assert_eq!(body["data"][0]["unread"], 2);

    let (_, body) = app.get(&format!("/chat/{}", budi.id), Some(&ani.token)).await;
    assert_eq!(body["data"]["messages"][0]["message"], "halo kak");
    assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 2);

    let (_, body) = app.get("/chat", Some(&ani.token)).await;
    assert_eq!(body["data"][0]["unread"], 0);
}

#[tokio::test]
async fn sitemap_lists_products_and_robots_points_to_it() {
    let app = TestApp::new();
    let seller = app.register("toko", None).await;
    app.set_role(&seller, Role::Seller).await;
    let (_, body) = app
        .post(
            "/marketplace/products",
            Some(&seller.token),
            json!({"name": "Ebook Rust", "description": "", "price": 5_000, "category": "ebook"}),
        )
        .await;
    let slug = body["data"]["slug"].as_str().unwrap().to_string();

    let (status, body) = app.get("/sitemap.xml", None).await;
    assert_eq!(status, StatusCode::OK);
    let xml = body.as_str().unwrap();
    assert!(xml.contains(&format!("https://shop.test/marketplace/product/{slug}")));
    assert!(xml.contains("<lastmod>"));

    let (_, body) = app.get("/robots.txt", None).await;
    let robots = body.as_str().unwrap();
    assert!(robots.contains("Disallow: /admin/"));
    assert!(robots.contains("Sitemap: https://shop.test/sitemap.xml"));
}
