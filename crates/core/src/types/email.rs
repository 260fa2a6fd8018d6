//! Email address type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Why a string was rejected as an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email cannot be empty")]
    Empty,
    #[error("email must be at most {max} characters")]
    TooLong { max: usize },
    #[error("email must contain exactly one @ symbol")]
    AtSymbol,
    /// Empty local part, or a domain without a dotted suffix.
    #[error("email must look like name@domain.tld")]
    Malformed,
    #[error("email cannot contain whitespace")]
    Whitespace,
}

/// A validated, lowercase email address.
///
/// Accounts are looked up by email, so the stored form is always normalized.
///
/// ```
/// use mobimarket_core::Email;
///
/// assert_eq!(Email::parse(" Ada@Example.com ").unwrap().as_str(), "ada@example.com");
/// assert!(Email::parse("no-at-symbol").is_err());
/// assert!(Email::parse("user@localhost").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// RFC 5321 upper bound.
    pub const MAX_LENGTH: usize = 254;

    /// Trim, validate, and lowercase `raw`.
    ///
    /// # Errors
    ///
    /// Returns an [`EmailError`] naming the first rule the input breaks.
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        let candidate = raw.trim();
        match candidate.len() {
            0 => return Err(EmailError::Empty),
            len if len > Self::MAX_LENGTH => {
                return Err(EmailError::TooLong {
                    max: Self::MAX_LENGTH,
                });
            }
            _ => {}
        }
        if candidate.contains(char::is_whitespace) {
            return Err(EmailError::Whitespace);
        }

        let (local, domain) = candidate.split_once('@').ok_or(EmailError::AtSymbol)?;
        if domain.contains('@') {
            return Err(EmailError::AtSymbol);
        }
        let dotted = domain
            .split_once('.')
            .is_some_and(|(name, suffix)| !name.is_empty() && !suffix.is_empty());
        if local.is_empty() || !dotted {
            return Err(EmailError::Malformed);
        }

        Ok(Self(candidate.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty() {
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
    }

    #[test]
    fn test_rejects_two_at_symbols() {
        assert_eq!(Email::parse("a@b@c.com"), Err(EmailError::AtSymbol));
    }

    #[test]
    fn test_rejects_missing_parts() {
        assert_eq!(Email::parse("@shop.com"), Err(EmailError::Malformed));
        assert_eq!(Email::parse("user@.com"), Err(EmailError::Malformed));
        assert_eq!(Email::parse("user@shop."), Err(EmailError::Malformed));
    }

    #[test]
    fn test_rejects_inner_whitespace() {
        assert_eq!(Email::parse("us er@shop.com"), Err(EmailError::Whitespace));
    }

    #[test]
    fn test_rejects_too_long() {
        let long = format!("{}@shop.com", "a".repeat(250));
        assert!(matches!(Email::parse(&long), Err(EmailError::TooLong { .. })));
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<Email>("\"bad\"").is_err());
        let ok: Result<Email, _> = serde_json::from_str("\"Buyer@Shop.com\"");
        assert_eq!(ok.map(Email::into_inner).ok().as_deref(), Some("buyer@shop.com"));
    }
}
