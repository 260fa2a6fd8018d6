//! Orders placed against the catalog.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{OrderId, ProductId, UserId};
use super::price::Price;
use super::status::OrderStatus;

/// Where an order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
}

/// One product line of an order, snapshotted at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Price,
    pub title: String,
    pub image: String,
}

/// An order as submitted by a shopper, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user: UserId,
    pub shipping_info: ShippingInfo,
    pub items: Vec<OrderItem>,
    pub subtotal: Price,
    pub tax: Price,
    pub shipping_charges: Price,
    pub discount: Price,
    pub total: Price,
}

impl NewOrder {
    /// Distinct products touched by this order, in id order.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        distinct_products(&self.items)
    }

    /// Units requested per product, summing repeated lines.
    ///
    /// Sums are widened to `u64`, so no line count a request body can carry
    /// wraps them.
    #[must_use]
    pub fn quantities(&self) -> BTreeMap<ProductId, u64> {
        let mut wanted: BTreeMap<ProductId, u64> = BTreeMap::new();
        for item in &self.items {
            let total = wanted.entry(item.product_id).or_default();
            *total = total.saturating_add(u64::from(item.quantity));
        }
        wanted
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user: UserId,
    pub shipping_info: ShippingInfo,
    pub items: Vec<OrderItem>,
    pub subtotal: Price,
    pub tax: Price,
    pub shipping_charges: Price,
    pub discount: Price,
    pub total: Price,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Distinct products touched by this order, in id order.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        distinct_products(&self.items)
    }
}

fn distinct_products(items: &[OrderItem]) -> Vec<ProductId> {
    items
        .iter()
        .map(|item| item.product_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
