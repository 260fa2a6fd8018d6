//! Which views each catalog mutation makes stale.

use std::collections::BTreeSet;

use mobimarket_core::ProductId;

use super::{CacheKey, CatalogCache};

/// A change to the catalog that cached views may depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogChange {
    ProductCreated,
    /// Fields or image of a product changed.
    ProductUpdated { id: ProductId },
    ProductDeleted { id: ProductId },
    /// A review was added to or replaced on a product.
    ReviewChanged { product_id: ProductId },
    /// An order took stock from these products.
    OrderPlaced { product_ids: Vec<ProductId> },
    /// A filtered search is about to read the catalog.
    CatalogSearched,
}

impl CatalogChange {
    /// Every cache key whose content depends on this change.
    #[must_use]
    pub fn stale_keys(&self) -> BTreeSet<CacheKey> {
        match self {
            Self::ProductCreated | Self::CatalogSearched => {
                CacheKey::AGGREGATES.into_iter().collect()
            }
            Self::ProductUpdated { id } | Self::ProductDeleted { id } => CacheKey::AGGREGATES
                .into_iter()
                .chain([CacheKey::ProductDetail(*id)])
                .collect(),
            // Listings embed ratings and review counts; categories do not move.
            Self::ReviewChanged { product_id } => [
                CacheKey::AllAdmin,
                CacheKey::Latest,
                CacheKey::ProductDetail(*product_id),
            ]
            .into_iter()
            .collect(),
            Self::OrderPlaced { product_ids } => CacheKey::AGGREGATES
                .into_iter()
                .chain(product_ids.iter().copied().map(CacheKey::ProductDetail))
                .collect(),
        }
    }
}

impl CatalogCache {
    /// Remove every view made stale by `change`.
    ///
    /// Called by each mutation after its write commits and before it responds.
    /// Tombstones no reader can still need are reclaimed on the way out.
    pub async fn invalidate(&self, change: &CatalogChange) {
        let keys: Vec<CacheKey> = change.stale_keys().into_iter().collect();
        tracing::debug!(
            change = ?change,
            keys = ?keys.iter().map(CacheKey::as_key).collect::<Vec<_>>(),
            "Invalidating catalog cache"
        );
        self.delete_many(&keys).await;
        self.reclaim_tombstones().await;
    }
}
