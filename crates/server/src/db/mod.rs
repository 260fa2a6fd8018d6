//! `PostgreSQL` implementations of the store traits.
//!
//! # Schema: `market`
//!
//! ## Tables
//!
//! - `user` - Accounts, roles and profile data
//! - `product` - Catalog, with denormalized `ratings` / `num_of_reviews`
//! - `review` - One review per (product, user)
//! - `order` / `order_item` - Placed orders and their line snapshots
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p mobimarket-cli -- migrate
//! ```

pub mod orders;
pub mod products;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use mobimarket_core::ProductId;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use orders::PgOrderStore;
pub use products::PgCatalogStore;
pub use users::PgUserStore;

use crate::store::Stores;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// An order asked for more units than are in stock.
    #[error("insufficient stock for product {product}: requested {requested}, available {available}")]
    InsufficientStock {
        product: ProductId,
        requested: u64,
        available: u32,
    },

    /// The store could not be reached; the caller may retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    pub(crate) fn corrupt(what: &str, err: impl std::fmt::Display) -> Self {
        Self::DataCorruption(format!("invalid {what} in database: {err}"))
    }
}

/// Map a unique violation to `Conflict`, anything else to `Database`.
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(err)
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Build the store bundle backed by one connection pool.
#[must_use]
pub fn postgres_stores(pool: &PgPool) -> Stores {
    Stores {
        catalog: Arc::new(PgCatalogStore::new(pool.clone())),
        users: Arc::new(PgUserStore::new(pool.clone())),
        orders: Arc::new(PgOrderStore::new(pool.clone())),
    }
}
