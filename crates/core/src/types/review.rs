//! Product reviews and ratings.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ReviewId, UserId};
use super::user::UserSummary;

/// Error returned for a rating outside `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rating must be between {min} and {max}, got {0}", min = Rating::MIN, max = Rating::MAX)]
pub struct RatingError(pub i64);

/// A star rating from 1 to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Create a rating.
    ///
    /// # Errors
    ///
    /// Returns `RatingError` if `value` is outside `1..=5`.
    pub fn new(value: i64) -> Result<Self, RatingError> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or(RatingError(value))
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, Self::MAX)
    }
}

/// Who wrote a review.
///
/// Reads that join the user table produce `Resolved`; a record that only
/// carries the foreign key deserializes as `Reference`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReviewAuthor {
    Resolved(UserSummary),
    Reference(UserId),
}

impl ReviewAuthor {
    /// The author's user id in either form.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::Resolved(summary) => summary.id,
            Self::Reference(id) => *id,
        }
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// A single user's review of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    #[serde(rename = "user")]
    pub author: ReviewAuthor,
    pub rating: Rating,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mean rating across reviews, `0.0` for none.
#[must_use]
pub fn average_rating(ratings: impl IntoIterator<Item = Rating>) -> f64 {
    let (sum, count) = ratings
        .into_iter()
        .fold((0_u32, 0_u32), |(sum, count), r| (sum + u32::from(r.0), count + 1));
    if count == 0 {
        0.0
    } else {
        f64::from(sum) / f64::from(count)
    }
}
