//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                   - Liveness
//! GET    /health/ready             - Store reachable
//!
//! # Products
//! GET    /product/latest           - Newest products (cached)
//! GET    /product/categories       - Distinct categories (cached)
//! GET    /product/admin-products   - Every product (admin, cached)
//! GET    /product/all              - Filtered, sorted, paginated search
//! POST   /product/new              - Create (admin)
//! PUT    /product/review           - Add or replace a review
//! GET    /product/{id}             - Product with reviews (cached)
//! PUT    /product/{id}             - Update (admin)
//! DELETE /product/{id}             - Delete (admin)
//!
//! # Users
//! POST   /user/new                 - Register
//! GET    /user/all                 - Every user (admin)
//! GET    /user/{id}                - One user
//! DELETE /user/{id}                - Delete (admin)
//!
//! # Orders
//! POST   /order/new                - Place an order
//! GET    /order/my?id=             - A user's orders
//! ```
//!
//! Successful responses share the `{"success": true, "message": ..., ...}`
//! envelope with [`crate::error::AppError`].

pub mod orders;
pub mod products;
pub mod users;

use std::str::FromStr;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    routing::{get, post, put},
};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{AppError, Result};
use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(state.config());

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/product", product_routes())
        .nest("/user", user_routes())
        .nest("/order", order_routes())
        .layer(cors)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/latest", get(products::latest))
        .route("/categories", get(products::categories))
        .route("/admin-products", get(products::admin_products))
        .route("/all", get(products::search))
        .route("/new", post(products::create))
        .route("/review", put(products::review))
        .route(
            "/{id}",
            get(products::detail)
                .put(products::update)
                .delete(products::delete),
        )
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/new", post(users::create))
        .route("/all", get(users::list))
        .route("/{id}", get(users::show).delete(users::delete))
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/new", post(orders::create))
        .route("/my", get(orders::mine))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.catalog().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Success envelope with one named payload field.
pub(crate) fn envelope(message: &str, field: &str, payload: impl serde::Serialize) -> Json<Value> {
    let mut body = json!({ "success": true, "message": message });
    if let (Some(map), Ok(value)) = (body.as_object_mut(), serde_json::to_value(payload)) {
        map.insert(field.to_string(), value);
    }
    Json(body)
}

/// Success envelope with only a message.
pub(crate) fn message(message: &str) -> Json<Value> {
    Json(json!({ "success": true, "message": message }))
}

/// Parse a path or query id, naming the entity in the error.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {what} id")))
}

/// An id sent in a JSON body, either as a number or as numeric text.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(untagged)]
pub(crate) enum BodyId {
    Number(i64),
    Text(String),
}

impl BodyId {
    /// Text form, ready for [`required`] and [`parse_id`].
    pub(crate) fn into_text(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(text) => text,
        }
    }
}

/// Trim a required text field, rejecting it when blank.
pub(crate) fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Please enter {field}")))
}

/// Trim an optional text field, treating blank as absent.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
