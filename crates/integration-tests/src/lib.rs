//! End-to-end harness for the MobiMarket API.
//!
//! Each [`TestApp`] builds the real router over a fresh in-memory store and a
//! fresh catalog cache, then drives it with `tower::ServiceExt::oneshot`. No
//! database or network is needed.
//!
//! ```rust,ignore
//! let app = TestApp::new();
//! let (status, body) = app.get("/product/latest").await;
//! assert_eq!(status, StatusCode::OK);
//! assert!(app.has(CacheKey::Latest).await);
//! ```

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use mobimarket_core::{Email, Gender, Price, Product, ProductImage, User, UserRole};
use mobimarket_server::cache::CacheKey;
use mobimarket_server::config::ServerConfig;
use mobimarket_server::routes;
use mobimarket_server::state::AppState;
use mobimarket_server::store::{CatalogStore, MemoryStore, NewProduct, NewUser, Stores, UserStore};
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

/// One isolated application instance.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    router: Router,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let config = ServerConfig::with_defaults(SecretString::from("postgres://unused/test"));
        let state = AppState::new(config, Stores::memory(Arc::clone(&store)));
        let router = routes::router(state.clone());
        Self {
            state,
            store,
            router,
        }
    }

    /// Send a request and return the status and JSON body
    /// (`Value::Null` for non-JSON bodies).
    pub async fn request(&self, method: Method, uri: &str, body: Option<&Value>) -> (StatusCode, Value) {
        let (status, _, body) = self.request_full(method, uri, body).await;
        (status, body)
    }

    /// Like [`Self::request`], also returning the response headers.
    pub async fn request_full(
        &self,
        method: Method,
        uri: &str,
        body: Option<&Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body is readable")
            .to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None).await
    }

    /// Whether the app's catalog cache holds a live entry for `key`.
    pub async fn has(&self, key: CacheKey) -> bool {
        self.state.cache().has(&key).await
    }

    /// Register a shopper directly in the store.
    pub async fn shopper(&self, name: &str) -> User {
        self.store
            .create_user(&NewUser {
                name: name.to_string(),
                email: Email::parse(&format!("{}@shop.example", name.to_lowercase()))
                    .expect("valid email"),
                image: format!("https://cdn.example/{name}.png"),
                gender: Gender::Female,
                dob: NaiveDate::from_ymd_opt(1994, 6, 15).expect("valid date"),
            })
            .await
            .expect("user created")
    }

    /// Register an admin directly in the store.
    pub async fn admin(&self) -> User {
        let user = self.shopper("Admin").await;
        self.store
            .set_role(user.id, UserRole::Admin)
            .await
            .expect("role set")
    }

    /// Add a product directly to the store, bypassing cache invalidation.
    pub async fn product(&self, title: &str, cents: u32, category: &str, stock: u32) -> Product {
        self.store
            .create_product(&NewProduct {
                title: title.to_string(),
                description: format!("{title} description"),
                price: Price::from_cents(cents),
                stock,
                category: category.to_string(),
                image: ProductImage {
                    public_id: format!("img/{title}"),
                    url: format!("https://cdn.example/{title}.png"),
                },
            })
            .await
            .expect("product created")
    }
}

/// Decode a JSON payload field into a typed value.
pub fn field<T: serde::de::DeserializeOwned>(body: &Value, name: &str) -> T {
    serde_json::from_value(body[name].clone()).expect("payload field has the expected shape")
}
