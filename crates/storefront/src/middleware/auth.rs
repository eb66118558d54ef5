//! Authentication extractors.
//!
//! Identity arrives in two headers:
//! - `Authorization: Bearer <jwt>` for registered users
//! - `X-Session-Id: <opaque>` for guest carts
//!
//! A malformed or expired bearer token is always rejected, even on routes
//! where authentication is optional.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use stitchery_core::{CartOwner, SessionId, UserId};

use crate::error::{AppError, set_sentry_user};
use crate::services::{AuthError, CommerceError};
use crate::services::cart::resolve_owner;
use crate::state::AppState;

/// The HTTP header carrying the guest session identifier.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// The authenticated caller, as stated by a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
    pub is_admin: bool,
}

impl CurrentUser {
    /// Whether this user may act on resources owned by `owner`.
    #[must_use]
    pub fn can_access(&self, owner: UserId) -> bool {
        self.is_admin || self.id == owner
    }
}

/// Extractor that requires a valid bearer token.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireUser(user): RequireUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireUser(pub CurrentUser);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        bearer_user(parts, state)?
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

/// Extractor that requires a valid bearer token for an admin user.
pub struct RequireAdmin(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireUser(user) = RequireUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "Admin route denied");
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(Self(user))
    }
}

/// Both identities a cart request may carry.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: Option<CurrentUser>,
    pub session_id: Option<SessionId>,
}

impl Identity {
    /// The cart owner: the user when authenticated, else the guest session.
    ///
    /// `fallback_session` is consulted only when no `X-Session-Id` header
    /// was sent.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::InvalidIdentity` if neither is present.
    pub fn owner(&self, fallback_session: Option<SessionId>) -> Result<CartOwner, CommerceError> {
        resolve_owner(
            self.user.as_ref().map(|u| u.id),
            self.session_id.clone().or(fallback_session),
        )
    }
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = bearer_user(parts, state)?;
        let session_id = parts
            .headers
            .get(SESSION_ID_HEADER)
            .map(|value| {
                value
                    .to_str()
                    .ok()
                    .and_then(|s| SessionId::parse(s).ok())
                    .ok_or_else(|| AppError::BadRequest("Invalid X-Session-Id header".to_string()))
            })
            .transpose()?;

        Ok(Self { user, session_id })
    }
}

/// Verify the bearer token, if one was sent.
fn bearer_user(parts: &Parts, state: &AppState) -> Result<Option<CurrentUser>, AppError> {
    let Some(header) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let token = header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidToken)?;

    let claims = state.jwt().verify(token)?;
    set_sentry_user(&claims.sub, Some(&claims.email));

    Ok(Some(CurrentUser {
        id: claims.sub,
        email: claims.email,
        is_admin: claims.is_admin,
    }))
}
