//! Order handlers.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};
use mobimarket_core::{NewOrder, UserId};
use serde::Deserialize;
use serde_json::Value;

use super::{envelope, parse_id, required};
use crate::cache::CatalogChange;
use crate::error::{AppError, Result};
use crate::state::AppState;

fn validate(order: &NewOrder) -> Result<()> {
    if order.items.is_empty() {
        return Err(AppError::BadRequest("Order has no items".to_string()));
    }
    if order.items.iter().any(|item| item.quantity == 0) {
        return Err(AppError::BadRequest(
            "Item quantities must be at least 1".to_string(),
        ));
    }
    let shipping = &order.shipping_info;
    let fields = [
        &shipping.address,
        &shipping.city,
        &shipping.state,
        &shipping.country,
        &shipping.postal_code,
    ];
    if fields.iter().any(|field| field.trim().is_empty()) {
        return Err(AppError::BadRequest(
            "Please enter all shipping fields".to_string(),
        ));
    }
    Ok(())
}

/// `POST /order/new`
///
/// Stock is taken from every ordered product, so their cached views are
/// invalidated along with the aggregates.
pub async fn create(
    State(state): State<AppState>,
    body: std::result::Result<Json<NewOrder>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(order) = body?;
    validate(&order)?;

    let placed = state.orders().place_order(&order).await?;
    state
        .cache()
        .invalidate(&CatalogChange::OrderPlaced {
            product_ids: placed.product_ids(),
        })
        .await;

    tracing::info!(order_id = %placed.id, user_id = %placed.user, "Order placed");
    Ok((
        StatusCode::CREATED,
        envelope("Order placed successfully", "order", placed),
    ))
}

#[derive(Debug, Deserialize)]
pub struct MyOrdersParams {
    id: Option<String>,
}

/// `GET /order/my?id=`
pub async fn mine(
    State(state): State<AppState>,
    params: std::result::Result<Query<MyOrdersParams>, QueryRejection>,
) -> Result<Json<Value>> {
    let Query(params) = params?;
    let user: UserId = parse_id(&required(params.id, "user id")?, "user")?;
    let orders = state.orders().orders_for_user(user).await?;
    Ok(envelope("Your orders", "orders", orders))
}
