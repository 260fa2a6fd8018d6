//! Account registration and order placement.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use mobimarket_core::{Order, Product, ProductDetail, User, UserId};
use mobimarket_integration_tests::{TestApp, field};
use serde_json::{Value, json};

fn order_body(user: UserId, product: &Product, quantity: u32) -> Value {
    json!({
        "user": user,
        "shipping_info": {
            "address": "1 Mall Rd",
            "city": "Lahore",
            "state": "Punjab",
            "country": "PK",
            "postal_code": "54000",
        },
        "items": [{
            "product_id": product.id,
            "quantity": quantity,
            "price": product.price,
            "title": product.title,
            "image": product.image.url,
        }],
        "subtotal": "0",
        "tax": "0",
        "shipping_charges": "0",
        "discount": "0",
        "total": "0",
    })
}

#[tokio::test]
async fn test_register_then_greet_existing_email() {
    let app = TestApp::new();
    let body = json!({
        "name": "Grace",
        "email": "Grace@Shop.example",
        "image": "https://cdn.example/grace.png",
        "gender": "female",
        "dob": "1990-12-09",
    });

    let (status, created) = app.post("/user/new", &body).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["message"], "Welcome, Grace");
    assert_eq!(created["user"]["email"], "grace@shop.example");
    assert!(created["user"]["age"].as_u64().is_some());

    let (status, again) = app.post("/user/new", &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["user"]["id"], created["user"]["id"]);
}

#[tokio::test]
async fn test_register_rejects_missing_fields() {
    let app = TestApp::new();
    let (status, body) = app
        .post("/user/new", &json!({ "name": "Grace", "email": "grace@shop.example" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_user_lookup_and_listing() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let shopper = app.shopper("Ada").await;

    let (status, body) = app.get(&format!("/user/{}", shopper.id)).await;
    assert_eq!(status, StatusCode::OK);
    let user: User = serde_json::from_value({
        let mut profile = body["user"].clone();
        profile.as_object_mut().unwrap().remove("age");
        profile
    })
    .unwrap();
    assert_eq!(user, shopper);

    let (status, _) = app.get("/user/404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get(&format!("/user/all?id={}", shopper.id)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app.get(&format!("/user/all?id={}", admin.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_order_takes_stock_and_lists_for_user() {
    let app = TestApp::new();
    let shopper = app.shopper("Ada").await;
    let phone = app.product("Pixel", 50_000, "phones", 5).await;

    let (status, body) = app.post("/order/new", &order_body(shopper.id, &phone, 2)).await;
    assert_eq!(status, StatusCode::CREATED);
    let placed: Order = field(&body, "order");
    assert_eq!(placed.user, shopper.id);

    let (_, body) = app.get(&format!("/product/{}", phone.id)).await;
    let detail: ProductDetail = field(&body, "product");
    assert_eq!(detail.product.stock, 3);

    let (status, body) = app.get(&format!("/order/my?id={}", shopper.id)).await;
    assert_eq!(status, StatusCode::OK);
    let orders: Vec<Order> = field(&body, "orders");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, placed.id);
}

#[tokio::test]
async fn test_order_beyond_stock_is_rejected() {
    let app = TestApp::new();
    let shopper = app.shopper("Ada").await;
    let phone = app.product("Pixel", 50_000, "phones", 1).await;

    let (status, body) = app.post("/order/new", &order_body(shopper.id, &phone, 2)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (_, body) = app.get(&format!("/product/{}", phone.id)).await;
    let detail: ProductDetail = field(&body, "product");
    assert_eq!(detail.product.stock, 1);

    let (_, body) = app.get(&format!("/order/my?id={}", shopper.id)).await;
    let orders: Vec<Order> = field(&body, "orders");
    assert!(orders.is_empty());
}

#[tokio::test]
async fn test_huge_repeated_lines_do_not_oversell() {
    let app = TestApp::new();
    let shopper = app.shopper("Ada").await;
    let phone = app.product("Pixel", 50_000, "phones", 5).await;

    let mut body = order_body(shopper.id, &phone, 2_147_483_648);
    let line = body["items"][0].clone();
    body["items"].as_array_mut().unwrap().push(line);

    let (status, body) = app.post("/order/new", &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (_, body) = app.get(&format!("/product/{}", phone.id)).await;
    let detail: ProductDetail = field(&body, "product");
    assert_eq!(detail.product.stock, 5);

    let (_, body) = app.get(&format!("/order/my?id={}", shopper.id)).await;
    let orders: Vec<Order> = field(&body, "orders");
    assert!(orders.is_empty());
}

#[tokio::test]
async fn test_order_for_unknown_product_is_not_found() {
    let app = TestApp::new();
    let shopper = app.shopper("Ada").await;
    let mut ghost = app.product("Pixel", 50_000, "phones", 1).await;
    ghost.id = mobimarket_core::ProductId::new(404);

    let (status, _) = app.post("/order/new", &order_body(shopper.id, &ghost, 1)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_user_deletion_rules() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let buyer = app.shopper("Ada").await;
    let browser = app.shopper("Lin").await;
    let phone = app.product("Pixel", 50_000, "phones", 5).await;
    app.post("/order/new", &order_body(buyer.id, &phone, 1)).await;

    let (status, _) = app.delete(&format!("/user/{}?id={}", admin.id, admin.id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.delete(&format!("/user/{}?id={}", buyer.id, admin.id)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .delete(&format!("/user/{}?id={}", browser.id, admin.id))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/user/{}", browser.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
