//! Catalog product models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;
use super::review::Review;

/// Reference to an image held by the external asset host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    /// Asset-host identifier, needed to delete or replace the asset.
    pub public_id: String,
    /// Public delivery URL.
    pub url: String,
}

/// A catalog product as listed in aggregate views.
///
/// `ratings` and `num_of_reviews` are denormalized from the product's reviews,
/// so listings change whenever a review does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub description: String,
    pub price: Price,
    pub stock: u32,
    /// Always lowercase.
    pub category: String,
    pub image: ProductImage,
    /// Mean review rating, `0.0` when there are no reviews.
    pub ratings: f64,
    pub num_of_reviews: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether `quantity` units can be sold right now.
    #[must_use]
    pub fn can_fulfil(&self, quantity: u64) -> bool {
        u64::from(self.stock) >= quantity
    }
}

/// A product together with its reviews, as served by the detail view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub reviews: Vec<Review>,
}

impl ProductDetail {
    /// Product id of this detail record.
    #[must_use]
    pub const fn id(&self) -> ProductId {
        self.product.id
    }

    /// Whether every review carries its author's profile rather than a bare id.
    #[must_use]
    pub fn has_resolved_authors(&self) -> bool {
        self.reviews.iter().all(|review| review.author.is_resolved())
    }
}
