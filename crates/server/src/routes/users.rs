//! User account handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use mobimarket_core::{Email, Gender, User, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{envelope, message, parse_id, required};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::state::AppState;
use crate::store::NewUser;

/// A user as returned by the API, with the derived age.
#[derive(Debug, Serialize)]
struct Profile<'a> {
    #[serde(flatten)]
    user: &'a User,
    age: u32,
}

impl<'a> Profile<'a> {
    fn of(user: &'a User) -> Self {
        Self {
            user,
            age: user.age_on(Utc::now().date_naive()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NewUserBody {
    name: Option<String>,
    email: Option<String>,
    image: Option<String>,
    gender: Option<String>,
    /// `YYYY-MM-DD`.
    dob: Option<String>,
}

impl NewUserBody {
    fn into_new_user(self) -> Result<NewUser> {
        let email = Email::parse(&required(self.email, "email")?)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        let gender: Gender = required(self.gender, "gender")?
            .to_lowercase()
            .parse()
            .map_err(AppError::BadRequest)?;
        let dob = NaiveDate::parse_from_str(&required(self.dob, "dob")?, "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest("dob must be YYYY-MM-DD".to_string()))?;

        Ok(NewUser {
            name: required(self.name, "name")?,
            email,
            image: required(self.image, "image")?,
            gender,
            dob,
        })
    }
}

/// `POST /user/new`
///
/// Registering an email that already exists greets the existing user.
pub async fn create(
    State(state): State<AppState>,
    body: std::result::Result<Json<NewUserBody>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(body) = body?;
    let input = body.into_new_user()?;

    if let Some(existing) = state.users().find_user_by_email(&input.email).await? {
        return Ok((
            StatusCode::OK,
            envelope(&format!("Welcome, {}", existing.name), "user", Profile::of(&existing)),
        ));
    }

    let user = state.users().create_user(&input).await?;
    tracing::info!(user_id = %user.id, "User registered");
    Ok((
        StatusCode::CREATED,
        envelope(&format!("Welcome, {}", user.name), "user", Profile::of(&user)),
    ))
}

/// `GET /user/all`
pub async fn list(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Value>> {
    let users = state.users().list_users().await?;
    let profiles: Vec<Profile<'_>> = users.iter().map(Profile::of).collect();
    Ok(envelope("All users", "users", profiles))
}

/// `GET /user/{id}`
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let id: UserId = parse_id(&id, "user")?;
    let user = state
        .users()
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(envelope("User details", "user", Profile::of(&user)))
}

/// `DELETE /user/{id}`
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let id: UserId = parse_id(&id, "user")?;
    if id == admin.id {
        return Err(AppError::BadRequest("You cannot delete yourself".to_string()));
    }
    state.users().delete_user(id).await?;
    tracing::info!(user_id = %id, admin = %admin.id, "User deleted");
    Ok(message("User deleted successfully"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn body() -> NewUserBody {
        NewUserBody {
            name: Some("Ada".into()),
            email: Some(" Ada@Shop.com ".into()),
            image: Some("https://cdn.example/ada.png".into()),
            gender: Some("Female".into()),
            dob: Some("1995-03-01".into()),
        }
    }

    #[test]
    fn test_body_normalizes_email_and_gender() {
        let user = body().into_new_user().unwrap();
        assert_eq!(user.email.as_str(), "ada@shop.com");
        assert_eq!(user.gender, Gender::Female);
    }

    #[test]
    fn test_body_rejects_bad_dob() {
        let bad = NewUserBody {
            dob: Some("01/03/1995".into()),
            ..body()
        };
        assert!(bad.into_new_user().is_err());
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let bad = NewUserBody { name: None, ..body() };
        let err = bad.into_new_user().unwrap_err();
        assert_eq!(err.to_string(), "Please enter name");
    }
}
