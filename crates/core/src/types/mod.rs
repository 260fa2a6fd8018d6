//! Core types for MobiMarket.
//!
//! Newtype wrappers for domain primitives plus the catalog, user and
//! order models that the server serializes into responses and cache entries.

pub mod email;
pub mod id;
pub mod order;
pub mod price;
pub mod product;
pub mod review;
pub mod status;
pub mod user;

pub use email::{Email, EmailError};
pub use id::*;
pub use order::{NewOrder, Order, OrderItem, ShippingInfo};
pub use price::{Price, PriceError};
pub use product::{Product, ProductDetail, ProductImage};
pub use review::{Rating, RatingError, Review, ReviewAuthor, average_rating};
pub use status::*;
pub use user::{User, UserSummary};
