//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Errors render as the same
//! `{"success": false, "message": ...}` envelope the success responses use.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] RepositoryError),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// Caller is not identified.
    #[error("{0}")]
    Unauthorized(String),

    /// Caller is identified but not allowed.
    #[error("{0}")]
    Forbidden(String),
}

impl AppError {
    /// HTTP status this error renders with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Store(err) => match err {
                RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
                RepositoryError::Conflict(_) => StatusCode::CONFLICT,
                RepositoryError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
                RepositoryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
                    if err.is_retryable() {
                        StatusCode::SERVICE_UNAVAILABLE
                    } else {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                }
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Client-facing message; server-side details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Store(err) => match err {
                RepositoryError::NotFound(what) => format!("Not found: {what}"),
                RepositoryError::Conflict(what) => what.clone(),
                RepositoryError::InsufficientStock { .. } => err.to_string(),
                RepositoryError::Unavailable(_) => "Service temporarily unavailable".to_string(),
                RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
                    if err.is_retryable() {
                        "Service temporarily unavailable".to_string()
                    } else {
                        "Internal server error".to_string()
                    }
                }
            },
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let body = json!({
            "success": false,
            "message": self.public_message(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the rest of the request.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use http_body_util::BodyExt;
    use mobimarket_core::ProductId;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_store_error_statuses() {
        let cases = [
            (RepositoryError::NotFound("product 1".into()), StatusCode::NOT_FOUND),
            (RepositoryError::Conflict("email".into()), StatusCode::CONFLICT),
            (
                RepositoryError::InsufficientStock {
                    product: ProductId::new(1),
                    requested: 2,
                    available: 1,
                },
                StatusCode::BAD_REQUEST,
            ),
            (RepositoryError::Unavailable("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                RepositoryError::DataCorruption("bad".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                RepositoryError::Database(sqlx::Error::PoolTimedOut),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn test_body_is_failure_envelope() {
        let response = AppError::Forbidden("Admins only".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Admins only");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let response =
            AppError::from(RepositoryError::DataCorruption("price -1".into())).into_response();
        let body = body_json(response).await;
        assert_eq!(body["message"], "Internal server error");
    }
}
