//! Type-safe price representation using decimal arithmetic.
//!
//! The store sells in a single currency (USD), so a price is just a
//! non-negative decimal amount in dollars.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    /// Amount is below zero.
    #[error("price cannot be negative")]
    Negative,
    /// Amount has more than two fractional digits.
    #[error("price must have at most two decimal places")]
    TooPrecise,
}

/// A price in USD.
///
/// Serializes as a decimal string (`"19.99"`) so no precision is lost in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Zero dollars.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a dollar amount.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative or has sub-cent precision.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        if amount.normalize().scale() > 2 {
            return Err(PriceError::TooPrecise);
        }
        Ok(Self(amount))
    }

    /// Create a price from a whole number of cents.
    #[must_use]
    pub fn from_cents(cents: u32) -> Self {
        Self(Decimal::new(i64::from(cents), 2))
    }

    /// The dollar amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_negative() {
        assert_eq!(Price::new(Decimal::new(-1, 0)), Err(PriceError::Negative));
    }

    #[test]
    fn test_rejects_sub_cent() {
        assert_eq!(Price::new(Decimal::new(1001, 3)), Err(PriceError::TooPrecise));
    }

    #[test]
    fn test_trailing_zeros_are_not_precision() {
        assert!(Price::new(Decimal::new(19_900, 3)).is_ok());
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::from_cents(1999).to_string(), "$19.99");
        assert_eq!(Price::from_cents(500).to_string(), "$5.00");
    }

    #[test]
    fn test_deserialize_from_number_and_string() {
        let from_str: Price = serde_json::from_str("\"12.50\"").unwrap();
        let from_num: Price = serde_json::from_str("12.5").unwrap();
        assert_eq!(from_str, from_num);
        assert!(serde_json::from_str::<Price>("\"-3\"").is_err());
    }
}
