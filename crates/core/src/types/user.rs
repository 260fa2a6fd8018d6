//! User accounts.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::UserId;
use super::status::{Gender, UserRole};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    /// Avatar URL.
    pub image: String,
    pub role: UserRole,
    pub gender: Gender,
    pub dob: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Age in whole years on `today`; zero for a date of birth in the future.
    #[must_use]
    pub fn age_on(&self, today: NaiveDate) -> u32 {
        let mut age = today.year() - self.dob.year();
        if (today.month(), today.day()) < (self.dob.month(), self.dob.day()) {
            age -= 1;
        }
        u32::try_from(age).unwrap_or(0)
    }

    /// The public profile embedded in review listings.
    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            image: self.image.clone(),
        }
    }
}

/// Public part of a user profile, embedded as a review's author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub image: String,
}
