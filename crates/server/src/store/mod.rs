//! Storage traits for the authoritative record system.
//!
//! Handlers and the catalog cache only ever talk to these traits. Two
//! backends implement them:
//!
//! - [`crate::db`] - `PostgreSQL` via `sqlx` (production)
//! - [`memory::MemoryStore`] - in-process maps (tests, local demos)

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use mobimarket_core::{
    Email, Gender, NewOrder, Order, Price, Product, ProductDetail, ProductId, ProductImage,
    Rating, User, UserId, UserRole,
};

use crate::db::RepositoryError;

pub use memory::MemoryStore;

// =============================================================================
// Query Types
// =============================================================================

/// Filter applied by the product search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
    /// Inclusive upper bound on price.
    pub max_price: Option<Price>,
    /// Exact (lowercase) category.
    pub category: Option<String>,
}

impl ProductFilter {
    /// Build a filter, dropping blank terms and lowercasing the category.
    #[must_use]
    pub fn new(search: Option<&str>, max_price: Option<Price>, category: Option<&str>) -> Self {
        let clean = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            search: clean(search),
            max_price,
            category: clean(category).map(|c| c.to_lowercase()),
        }
    }

    /// Whether `product` passes this filter.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        let title_ok = self.search.as_ref().is_none_or(|needle| {
            product
                .title
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        let price_ok = self.max_price.is_none_or(|max| product.price <= max);
        let category_ok = self
            .category
            .as_ref()
            .is_none_or(|category| &product.category == category);
        title_ok && price_ok && category_ok
    }
}

/// Sort direction on price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceOrder {
    Ascending,
    Descending,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    pub size: u32,
}

impl Page {
    /// Page `number` (clamped to at least 1) of `size` items.
    #[must_use]
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size,
        }
    }

    /// Number of items skipped before this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.number as u64 - 1) * self.size as u64
    }

    /// Number of pages needed for `total` items.
    #[must_use]
    pub const fn count_for(total: u64, size: u32) -> u64 {
        if size == 0 {
            0
        } else {
            total.div_ceil(size as u64)
        }
    }
}

/// Full product search request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub filter: ProductFilter,
    /// `None` keeps insertion (id) order.
    pub order: Option<PriceOrder>,
    /// `None` returns every match.
    pub page: Option<Page>,
}

// =============================================================================
// Write Types
// =============================================================================

/// Fields of a product being created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub price: Price,
    pub stock: u32,
    /// Stored lowercase.
    pub category: String,
    pub image: ProductImage,
}

/// Partial update of a product.
///
/// `None` leaves a field unchanged, except `description`, which is always
/// replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductUpdate {
    pub title: Option<String>,
    pub price: Option<Price>,
    pub stock: Option<u32>,
    pub category: Option<String>,
    pub description: String,
    pub image: Option<ProductImage>,
}

impl ProductUpdate {
    /// Apply this update to an in-memory product.
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(title) = &self.title {
            product.title.clone_from(title);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(category) = &self.category {
            product.category = category.to_lowercase();
        }
        product.description.clone_from(&self.description);
        if let Some(image) = &self.image {
            product.image = image.clone();
        }
    }
}

/// A user's review of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewInput {
    pub product_id: ProductId,
    pub user_id: UserId,
    pub rating: Rating,
    pub comment: String,
}

/// Whether a review upsert created or replaced the user's review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Created,
    Updated,
}

/// Fields of a user being registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: Email,
    pub image: String,
    pub gender: Gender,
    pub dob: NaiveDate,
}

// =============================================================================
// Traits
// =============================================================================

/// The authoritative product / review record system.
///
/// Implementations never cache; the read-through layer in [`crate::cache`]
/// sits in front of them.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Verify the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Find a product by id.
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Find a product with its reviews and every review author resolved.
    async fn product_detail(&self, id: ProductId)
    -> Result<Option<ProductDetail>, RepositoryError>;

    /// Search products with filter, sort and pagination.
    async fn search_products(&self, query: &ProductQuery) -> Result<Vec<Product>, RepositoryError>;

    /// Count products matching `filter`.
    async fn count_products(&self, filter: &ProductFilter) -> Result<u64, RepositoryError>;

    /// Newest `limit` products by creation time.
    async fn latest_products(&self, limit: u32) -> Result<Vec<Product>, RepositoryError>;

    /// Every product, in id order.
    async fn all_products(&self) -> Result<Vec<Product>, RepositoryError> {
        self.search_products(&ProductQuery::default()).await
    }

    /// Distinct categories, sorted.
    async fn categories(&self) -> Result<Vec<String>, RepositoryError>;

    /// Insert a product.
    async fn create_product(&self, input: &NewProduct) -> Result<Product, RepositoryError>;

    /// Update a product.
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    async fn update_product(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, RepositoryError>;

    /// Delete a product and its reviews, returning the deleted product.
    ///
    /// Returns `RepositoryError::NotFound` if it does not exist.
    async fn delete_product(&self, id: ProductId) -> Result<Product, RepositoryError>;

    /// Insert or replace a user's review and recompute the product's ratings.
    ///
    /// Returns `RepositoryError::NotFound` if the product or user does not exist.
    async fn upsert_review(&self, input: &ReviewInput) -> Result<ReviewOutcome, RepositoryError>;
}

/// User accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;

    /// Returns `RepositoryError::Conflict` if the email is taken.
    async fn create_user(&self, input: &NewUser) -> Result<User, RepositoryError>;

    /// Returns `RepositoryError::Conflict` while the user still has reviews or
    /// orders, `RepositoryError::NotFound` if there is no such user.
    async fn delete_user(&self, id: UserId) -> Result<User, RepositoryError>;

    /// Returns `RepositoryError::NotFound` if there is no such user.
    async fn set_role(&self, id: UserId, role: UserRole) -> Result<User, RepositoryError>;
}

/// Orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist an order and take its quantities out of stock atomically.
    ///
    /// Returns `RepositoryError::InsufficientStock` (and changes nothing) if
    /// any line asks for more than is available.
    async fn place_order(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    /// Orders placed by `user`, newest first.
    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>, RepositoryError>;
}

/// The set of stores a server instance runs against.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub users: Arc<dyn UserStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl Stores {
    /// All three stores backed by one in-memory instance.
    #[must_use]
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            catalog: store.clone(),
            users: store.clone(),
            orders: store,
        }
    }
}
