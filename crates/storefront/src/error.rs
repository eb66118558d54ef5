//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{AuthError, CommerceError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Catalog, cart or order operation failed.
    #[error(transparent)]
    Commerce(#[from] CommerceError),

    /// Authentication or user operation failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Caller is not authenticated.
    #[error("{0}")]
    Unauthorized(String),

    /// Caller is authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Commerce(err) => commerce_status(err),
            Self::Auth(err) => auth_status(err),
            Self::Database(err) => repository_status(err),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

const fn commerce_status(err: &CommerceError) -> StatusCode {
    match err {
        CommerceError::InvalidIdentity => StatusCode::UNAUTHORIZED,
        CommerceError::Unauthorized => StatusCode::FORBIDDEN,
        CommerceError::ProductNotFound { .. }
        | CommerceError::CartItemNotFound { .. }
        | CommerceError::OrderNotFound { .. }
        | CommerceError::CategoryNotFound { .. } => StatusCode::NOT_FOUND,
        CommerceError::ProductUnavailable { .. }
        | CommerceError::InsufficientStock { .. }
        | CommerceError::EmptyCart
        | CommerceError::InvalidStatusTransition { .. }
        | CommerceError::Validation(_) => StatusCode::BAD_REQUEST,
        CommerceError::CategoryNameTaken { .. }
        | CommerceError::CategoryInUse { .. } => StatusCode::CONFLICT,
        CommerceError::Repository(err) => repository_status(err),
    }
}

const fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidEmail(_) | AuthError::WeakPassword(_) | AuthError::Validation(_) => {
            StatusCode::BAD_REQUEST
        }
        AuthError::InvalidCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
        AuthError::UserNotFound => StatusCode::NOT_FOUND,
        AuthError::UserAlreadyExists => StatusCode::CONFLICT,
        AuthError::TokenSigning(_) | AuthError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
        AuthError::Repository(err) => repository_status(err),
    }
}

const fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_),
        ) => StatusCode::SERVICE_UNAVAILABLE,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
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
        }

        // Don't expose internal error details to clients
        let message = match status {
            StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable".to_string(),
            s if s.is_server_error() => "Internal server error".to_string(),
            _ => match &self {
                Self::Commerce(CommerceError::Repository(RepositoryError::Conflict(msg)))
                | Self::Auth(AuthError::Repository(RepositoryError::Conflict(msg)))
                | Self::Database(RepositoryError::Conflict(msg)) => msg.clone(),
                Self::Commerce(CommerceError::Repository(RepositoryError::NotFound))
                | Self::Auth(AuthError::Repository(RepositoryError::NotFound))
                | Self::Database(RepositoryError::NotFound) => "Not found".to_string(),
                Self::Auth(AuthError::InvalidEmail(_)) => "Invalid email address".to_string(),
                _ => self.to_string(),
            },
        };

        let body = ErrorBody {
            error: status.canonical_reason().unwrap_or("Error"),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
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
    use super::*;
    use stitchery_core::{OrderStatus, ProductId};

    fn get_status(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_app_error_status_codes() {
        let product_id = ProductId::generate();

        assert_eq!(
            get_status(CommerceError::InvalidIdentity),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(CommerceError::ProductNotFound { product_id }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(CommerceError::InsufficientStock {
                product_id,
                requested: 3,
                available: 1,
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(CommerceError::InvalidStatusTransition {
                from: OrderStatus::Shipped,
                to: OrderStatus::Cancelled,
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(get_status(CommerceError::Unauthorized), StatusCode::FORBIDDEN);
        assert_eq!(get_status(AuthError::UserAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(
            get_status(AuthError::InvalidCredentials),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("admin only".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(RepositoryError::Database(sqlx::Error::PoolTimedOut)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_body_hides_server_details() {
        let response =
            AppError::Database(RepositoryError::DataCorruption("bad row 42".to_string()))
                .into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["error"], "Internal Server Error");
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_error_body_carries_client_message() {
        let response = AppError::from(CommerceError::EmptyCart).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["error"], "Bad Request");
        assert_eq!(body["message"], "cart is empty");
    }
}
