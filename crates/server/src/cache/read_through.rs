//! Read-through accessors for the four cached catalog views.

use std::future::Future;

use mobimarket_core::{Product, ProductDetail, ProductId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use super::{CacheKey, CatalogCache};
use crate::db::RepositoryError;
use crate::store::CatalogStore;

/// Serves catalog views from the cache, querying the store on a miss.
///
/// Store failures propagate to the caller and leave the key missing.
#[derive(Clone, Copy)]
pub struct CatalogReader<'a> {
    cache: &'a CatalogCache,
    store: &'a dyn CatalogStore,
    latest_limit: u32,
}

impl<'a> CatalogReader<'a> {
    #[must_use]
    pub const fn new(cache: &'a CatalogCache, store: &'a dyn CatalogStore, latest_limit: u32) -> Self {
        Self {
            cache,
            store,
            latest_limit,
        }
    }

    /// Newest products.
    ///
    /// # Errors
    ///
    /// Returns the store's error on a miss that cannot be filled.
    #[instrument(skip(self))]
    pub async fn latest_products(&self) -> Result<Vec<Product>, RepositoryError> {
        self.read_through(
            CacheKey::Latest,
            || self.store.latest_products(self.latest_limit),
            |_| true,
        )
        .await
    }

    /// Every product, for the admin listing.
    ///
    /// # Errors
    ///
    /// Returns the store's error on a miss that cannot be filled.
    #[instrument(skip(self))]
    pub async fn all_products(&self) -> Result<Vec<Product>, RepositoryError> {
        self.read_through(CacheKey::AllAdmin, || self.store.all_products(), |_| true)
            .await
    }

    /// Distinct categories.
    ///
    /// # Errors
    ///
    /// Returns the store's error on a miss that cannot be filled.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        self.read_through(CacheKey::Categories, || self.store.categories(), |_| true)
            .await
    }

    /// One product with its reviews and their authors.
    ///
    /// A cached entry for another id, or one whose review authors are bare
    /// ids, counts as a miss.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist, or
    /// the store's error on a miss that cannot be filled.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product_detail(&self, id: ProductId) -> Result<ProductDetail, RepositoryError> {
        self.read_through(
            CacheKey::ProductDetail(id),
            || async move {
                self.store
                    .product_detail(id)
                    .await?
                    .ok_or_else(|| RepositoryError::NotFound(format!("product {id}")))
            },
            |detail: &ProductDetail| detail.id() == id && detail.has_resolved_authors(),
        )
        .await
    }

    async fn read_through<T, Q, Fut>(
        &self,
        key: CacheKey,
        query: Q,
        accept: impl Fn(&T) -> bool + Send,
    ) -> Result<T, RepositoryError>
    where
        T: Serialize + DeserializeOwned + Send,
        Q: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, RepositoryError>> + Send,
    {
        if let Some(payload) = self.cache.get(&key).await {
            match serde_json::from_str::<T>(&payload) {
                Ok(value) if accept(&value) => {
                    tracing::debug!(key = %key, "Cache hit");
                    return Ok(value);
                }
                Ok(_) => tracing::debug!(key = %key, "Cached entry failed validation"),
                Err(e) => tracing::warn!(key = %key, error = %e, "Unreadable cache entry"),
            }
        }

        let ticket = self.cache.ticket();
        let value = query().await?;

        match serde_json::to_string(&value) {
            Ok(payload) => {
                self.cache.populate(&key, payload, ticket).await;
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "Failed to serialize catalog view"),
        }
        Ok(value)
    }
}
