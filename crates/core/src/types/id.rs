//! Entity identifiers.
//!
//! Ids are database serials. Each entity has its own wrapper so a review id
//! can't end up in a product lookup.

/// Error returned when an ID cannot be parsed from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid id: {0}")]
pub struct IdParseError(pub String);

/// Declare an `i32`-backed identifier.
///
/// The generated type is `Copy`, totally ordered, serializes as a bare
/// number, and round-trips through `Display`/`FromStr` so it can be read
/// from paths and query strings. With the `postgres` feature it binds as
/// an `INTEGER` column.
///
/// ```rust
/// # use mobimarket_core::define_id;
/// define_id!(WishlistId);
///
/// let id: WishlistId = "42".parse().unwrap();
/// assert_eq!(id.to_string(), "42");
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        #[cfg_attr(feature = "postgres", derive(::sqlx::Type), sqlx(transparent))]
        pub struct $name(i32);

        impl $name {
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            /// Raw serial value, for binding and logging.
            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::types::id::IdParseError;

            fn from_str(raw: &str) -> ::core::result::Result<Self, Self::Err> {
                match raw.trim().parse::<i32>() {
                    Ok(value) => Ok(Self(value)),
                    Err(_) => Err($crate::types::id::IdParseError(raw.to_owned())),
                }
            }
        }
    };
}

define_id!(UserId);
define_id!(ProductId);
define_id!(ReviewId);
define_id!(OrderId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_whitespace() {
        let id: ProductId = " 7 ".parse().unwrap();
        assert_eq!(id, ProductId::new(7));
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        let err = "abc".parse::<ProductId>().unwrap_err();
        assert_eq!(err.to_string(), "invalid id: abc");
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&UserId::new(12)).unwrap();
        assert_eq!(json, "12");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_i32(), 12);
    }

    #[test]
    fn test_ordering_follows_serial() {
        let mut ids = vec![OrderId::new(3), OrderId::new(1), OrderId::new(2)];
        ids.sort();
        assert_eq!(ids, [OrderId::new(1), OrderId::new(2), OrderId::new(3)]);
    }
}
