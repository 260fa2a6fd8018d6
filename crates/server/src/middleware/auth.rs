//! Admin gate for catalog management routes.
//!
//! Callers identify themselves with an `id` query parameter; the gate loads
//! that user and lets the request through only for admins.

use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use mobimarket_core::{User, UserId};
use serde::Deserialize;

use crate::error::{AppError, set_sentry_user};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CallerQuery {
    id: Option<String>,
}

/// Extractor that requires the caller to be an admin.
///
/// # Example
///
/// ```rust,ignore
/// async fn delete_product(RequireAdmin(admin): RequireAdmin) -> Result<Json<Value>> {
///     tracing::info!(admin = %admin.id, "Deleting product");
///     // ...
/// }
/// ```
#[derive(Debug)]
pub struct RequireAdmin(pub User);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = Query::<CallerQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AppError::Unauthorized("Please log in first".to_string()))?;

        let id: UserId = raw
            .parse()
            .map_err(|_| AppError::Unauthorized("Invalid user id".to_string()))?;

        let user = state
            .users()
            .find_user(id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid user id".to_string()))?;

        if !user.role.is_admin() {
            return Err(AppError::Forbidden(
                "You are not allowed to do this".to_string(),
            ));
        }

        set_sentry_user(&user.id, Some(user.email.as_str()));
        Ok(Self(user))
    }
}
