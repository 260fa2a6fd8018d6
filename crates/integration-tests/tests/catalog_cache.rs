//! Cached catalog views stay consistent with writes made through the API.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use mobimarket_core::{Price, Product, ProductDetail, ReviewAuthor};
use mobimarket_integration_tests::{TestApp, field};
use mobimarket_server::cache::CacheKey;
use serde_json::json;

#[tokio::test]
async fn test_price_change_reaches_latest_listing() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let phone = app.product("Pixel", 50_000, "phones", 5).await;

    let (status, body) = app.get("/product/latest").await;
    assert_eq!(status, StatusCode::OK);
    let before: Vec<Product> = field(&body, "products");
    assert_eq!(before[0].price, Price::from_cents(50_000));
    assert!(app.has(CacheKey::Latest).await);

    let (status, _) = app
        .put(
            &format!("/product/{}?id={}", phone.id, admin.id),
            &json!({ "price": "450.00" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.has(CacheKey::Latest).await);
    assert!(!app.has(CacheKey::AllAdmin).await);

    let (_, body) = app.get("/product/latest").await;
    let after: Vec<Product> = field(&body, "products");
    assert_eq!(after[0].price, Price::from_cents(45_000));
}

#[tokio::test]
async fn test_review_reaches_cached_detail() {
    let app = TestApp::new();
    let phone = app.product("Pixel", 50_000, "phones", 5).await;
    let shopper = app.shopper("Ada").await;
    let detail_uri = format!("/product/{}", phone.id);

    let (status, body) = app.get(&detail_uri).await;
    assert_eq!(status, StatusCode::OK);
    let empty: ProductDetail = field(&body, "product");
    assert!(empty.reviews.is_empty());
    assert!(app.has(CacheKey::ProductDetail(phone.id)).await);

    app.get("/product/latest").await;
    let (status, body) = app
        .put(
            "/product/review",
            &json!({
                "id": phone.id.to_string(),
                "user": shopper.id.to_string(),
                "rating": 4,
                "comment": "Great camera",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Review added");
    assert!(!app.has(CacheKey::ProductDetail(phone.id)).await);
    assert!(!app.has(CacheKey::Latest).await);

    let (_, body) = app.get(&detail_uri).await;
    let detail: ProductDetail = field(&body, "product");
    assert_eq!(detail.reviews.len(), 1);
    assert_eq!(detail.product.num_of_reviews, 1);
    match &detail.reviews[0].author {
        ReviewAuthor::Resolved(author) => assert_eq!(author.name, "Ada"),
        ReviewAuthor::Reference(id) => panic!("author {id} was not resolved"),
    }

    let (_, body) = app
        .put(
            "/product/review",
            &json!({
                "id": phone.id.to_string(),
                "user": shopper.id.to_string(),
                "rating": 2,
                "comment": "Battery fades",
            }),
        )
        .await;
    assert_eq!(body["message"], "Review updated");

    let (_, body) = app.get(&detail_uri).await;
    let detail: ProductDetail = field(&body, "product");
    assert_eq!(detail.reviews.len(), 1);
    assert!((detail.product.ratings - 2.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_deleting_last_product_in_category_clears_views() {
    let app = TestApp::new();
    let admin = app.admin().await;
    app.product("Pixel", 50_000, "phones", 5).await;
    let tablet = app.product("Tab", 30_000, "tablets", 2).await;

    let (_, body) = app.get("/product/categories").await;
    let categories: Vec<String> = field(&body, "categories");
    assert_eq!(categories, ["phones", "tablets"]);
    app.get(&format!("/product/{}", tablet.id)).await;
    app.get(&format!("/product/admin-products?id={}", admin.id)).await;
    assert!(app.has(CacheKey::Categories).await);
    assert!(app.has(CacheKey::AllAdmin).await);

    let (status, _) = app
        .delete(&format!("/product/{}?id={}", tablet.id, admin.id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.has(CacheKey::Categories).await);
    assert!(!app.has(CacheKey::AllAdmin).await);
    assert!(!app.has(CacheKey::ProductDetail(tablet.id)).await);

    let (_, body) = app.get("/product/categories").await;
    let categories: Vec<String> = field(&body, "categories");
    assert_eq!(categories, ["phones"]);

    let (status, _) = app.get(&format!("/product/{}", tablet.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!app.has(CacheKey::ProductDetail(tablet.id)).await);
}

#[tokio::test]
async fn test_create_leaves_other_details_cached() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let phone = app.product("Pixel", 50_000, "phones", 5).await;
    app.get(&format!("/product/{}", phone.id)).await;
    app.get("/product/latest").await;

    let (status, body) = app
        .post(
            &format!("/product/new?id={}", admin.id),
            &json!({
                "title": "Galaxy",
                "description": "Folding phone",
                "price": "999.99",
                "stock": 3,
                "category": "Phones",
                "image_url": "https://cdn.example/galaxy.png",
                "image_public_id": "img/galaxy",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: Product = field(&body, "product");
    assert_eq!(created.category, "phones");

    assert!(!app.has(CacheKey::Latest).await);
    assert!(app.has(CacheKey::ProductDetail(phone.id)).await);

    let (_, body) = app.get("/product/latest").await;
    let latest: Vec<Product> = field(&body, "products");
    assert_eq!(latest[0].id, created.id);
}

#[tokio::test]
async fn test_repeat_reads_are_served_from_cache() {
    let app = TestApp::new();
    app.product("Pixel", 50_000, "phones", 5).await;

    app.get("/product/latest").await;
    let reads = app.store.catalog_reads();
    let (status, _) = app.get("/product/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.catalog_reads(), reads);
}

#[tokio::test]
async fn test_failed_read_is_not_cached() {
    let app = TestApp::new();
    app.product("Pixel", 50_000, "phones", 5).await;

    app.store.set_unavailable(true);
    let (status, body) = app.get("/product/latest").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert!(!app.has(CacheKey::Latest).await);

    app.store.set_unavailable(false);
    let (status, body) = app.get("/product/latest").await;
    assert_eq!(status, StatusCode::OK);
    let latest: Vec<Product> = field(&body, "products");
    assert_eq!(latest.len(), 1);
}

#[tokio::test]
async fn test_search_clears_aggregates_but_not_details() {
    let app = TestApp::new();
    let phone = app.product("Pixel", 50_000, "phones", 5).await;
    app.get("/product/latest").await;
    app.get("/product/categories").await;
    app.get(&format!("/product/{}", phone.id)).await;

    let (status, _) = app.get("/product/all?search=pix").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.has(CacheKey::Latest).await);
    assert!(!app.has(CacheKey::Categories).await);
    assert!(app.has(CacheKey::ProductDetail(phone.id)).await);
}

#[tokio::test]
async fn test_order_clears_detail_of_ordered_products() {
    let app = TestApp::new();
    let shopper = app.shopper("Ada").await;
    let phone = app.product("Pixel", 50_000, "phones", 5).await;
    let tablet = app.product("Tab", 30_000, "tablets", 2).await;
    app.get(&format!("/product/{}", phone.id)).await;
    app.get(&format!("/product/{}", tablet.id)).await;
    app.get("/product/latest").await;

    let (status, _) = app
        .post(
            "/order/new",
            &json!({
                "user": shopper.id,
                "shipping_info": {
                    "address": "1 Mall Rd",
                    "city": "Lahore",
                    "state": "Punjab",
                    "country": "PK",
                    "postal_code": "54000",
                },
                "items": [{
                    "product_id": phone.id,
                    "quantity": 2,
                    "price": "500.00",
                    "title": "Pixel",
                    "image": "https://cdn.example/Pixel.png",
                }],
                "subtotal": "1000.00",
                "tax": "0",
                "shipping_charges": "0",
                "discount": "0",
                "total": "1000.00",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!app.has(CacheKey::ProductDetail(phone.id)).await);
    assert!(!app.has(CacheKey::Latest).await);
    assert!(app.has(CacheKey::ProductDetail(tablet.id)).await);

    let (_, body) = app.get(&format!("/product/{}", phone.id)).await;
    let detail: ProductDetail = field(&body, "product");
    assert_eq!(detail.product.stock, 3);
}
