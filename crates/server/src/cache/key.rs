//! Cache key naming.

use std::fmt;

use mobimarket_core::ProductId;

/// One cached catalog view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// Newest products, as shown on the storefront landing page.
    Latest,
    /// Every product, as listed in the admin dashboard.
    AllAdmin,
    /// Distinct product categories.
    Categories,
    /// One product with its reviews.
    ProductDetail(ProductId),
}

impl CacheKey {
    /// The aggregate views, which any catalog-wide change makes stale.
    pub const AGGREGATES: [Self; 3] = [Self::AllAdmin, Self::Latest, Self::Categories];

    /// The storage key string.
    #[must_use]
    pub fn as_key(&self) -> String {
        match self {
            Self::Latest => "latest-products".to_string(),
            Self::AllAdmin => "all-products".to_string(),
            Self::Categories => "categories".to_string(),
            Self::ProductDetail(id) => format!("product-{id}"),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}
