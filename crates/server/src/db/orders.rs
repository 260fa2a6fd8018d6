//! Database operations for orders.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mobimarket_core::{
    NewOrder, Order, OrderId, OrderItem, Price, ProductId, ShippingInfo, UserId,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use super::RepositoryError;
use crate::store::OrderStore;

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    address: String,
    city: String,
    state: String,
    country: String,
    postal_code: String,
    subtotal: Decimal,
    tax: Decimal,
    shipping_charges: Decimal,
    discount: Decimal,
    total: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    order_id: OrderId,
    product_id: ProductId,
    quantity: i32,
    price: Decimal,
    title: String,
    image: String,
}

fn price(value: Decimal, what: &str) -> Result<Price, RepositoryError> {
    Price::new(value).map_err(|e| RepositoryError::corrupt(what, e))
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: row.product_id,
            quantity: u32::try_from(row.quantity)
                .map_err(|e| RepositoryError::corrupt("quantity", e))?,
            price: price(row.price, "item price")?,
            title: row.title,
            image: row.image,
        })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        Ok(Order {
            id: self.id,
            user: self.user_id,
            shipping_info: ShippingInfo {
                address: self.address,
                city: self.city,
                state: self.state,
                country: self.country,
                postal_code: self.postal_code,
            },
            items,
            subtotal: price(self.subtotal, "subtotal")?,
            tax: price(self.tax, "tax")?,
            shipping_charges: price(self.shipping_charges, "shipping charges")?,
            discount: price(self.discount, "discount")?,
            total: price(self.total, "total")?,
            status: self
                .status
                .parse()
                .map_err(|e: String| RepositoryError::corrupt("order status", e))?,
            created_at: self.created_at,
        })
    }
}

fn to_db_int(value: u32) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| RepositoryError::Conflict("quantity out of range".to_string()))
}

/// `PostgreSQL` order store.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    #[instrument(skip(self, order), fields(user_id = %order.user, items = order.items.len()))]
    async fn place_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let wanted = order.quantities();
        let mut tx = self.pool.begin().await?;

        // Rows are locked in product id order.
        for (&product_id, &requested) in &wanted {
            // A sum beyond the INTEGER column can never be in stock.
            let updated: Option<ProductId> = match i32::try_from(requested) {
                Ok(units) => {
                    sqlx::query_scalar(
                        r"
                        UPDATE market.product
                        SET stock = stock - $2, updated_at = NOW()
                        WHERE id = $1 AND stock >= $2
                        RETURNING id
                        ",
                    )
                    .bind(product_id)
                    .bind(units)
                    .fetch_optional(&mut *tx)
                    .await?
                }
                Err(_) => None,
            };

            if updated.is_none() {
                let available: Option<i32> =
                    sqlx::query_scalar("SELECT stock FROM market.product WHERE id = $1")
                        .bind(product_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return Err(match available {
                    None => RepositoryError::NotFound(format!("product {product_id}")),
                    Some(available) => RepositoryError::InsufficientStock {
                        product: product_id,
                        requested,
                        available: u32::try_from(available).unwrap_or(0),
                    },
                });
            }
        }

        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            INSERT INTO market."order"
                (user_id, address, city, state, country, postal_code,
                 subtotal, tax, shipping_charges, discount, total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, user_id, address, city, state, country, postal_code,
                      subtotal, tax, shipping_charges, discount, total, status, created_at
            "#,
        )
        .bind(order.user)
        .bind(&order.shipping_info.address)
        .bind(&order.shipping_info.city)
        .bind(&order.shipping_info.state)
        .bind(&order.shipping_info.country)
        .bind(&order.shipping_info.postal_code)
        .bind(order.subtotal.amount())
        .bind(order.tax.amount())
        .bind(order.shipping_charges.amount())
        .bind(order.discount.amount())
        .bind(order.total.amount())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                RepositoryError::NotFound(format!("user {}", order.user))
            }
            other => RepositoryError::Database(other),
        })?;

        for (position, item) in (0_i32..).zip(&order.items) {
            sqlx::query(
                r"
                INSERT INTO market.order_item
                    (order_id, position, product_id, quantity, price, title, image)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(row.id)
            .bind(position)
            .bind(item.product_id)
            .bind(to_db_int(item.quantity)?)
            .bind(item.price.amount())
            .bind(&item.title)
            .bind(&item.image)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        row.into_order(order.items.clone())
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, user_id, address, city, state, country, postal_code,
                   subtotal, tax, shipping_charges, discount, total, status, created_at
            FROM market."order"
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i32> = rows.iter().map(|row| row.id.as_i32()).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT order_id, product_id, quantity, price, title, image
            FROM market.order_item
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: BTreeMap<OrderId, Vec<OrderItem>> = BTreeMap::new();
        for row in item_rows {
            items
                .entry(row.order_id)
                .or_default()
                .push(OrderItem::try_from(row)?);
        }

        rows.into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_order(lines)
            })
            .collect()
    }
}
