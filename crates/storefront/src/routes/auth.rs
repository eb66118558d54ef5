//! Registration, login and profile.

use axum::{Json, extract::State, http::StatusCode};
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::User;
use crate::services::AuthService;
use crate::services::auth::{LoginInput, LoginResponse, RegisterInput};
use crate::state::AppState;

/// Create a customer account.
#[instrument(skip(state, input))]
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<User>)> {
    let user = AuthService::new(state.store(), state.jwt())
        .register(input)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Exchange email and password for an access token.
#[instrument(skip(state, input))]
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<Json<LoginResponse>> {
    let response = AuthService::new(state.store(), state.jwt())
        .login(input)
        .await?;
    Ok(Json(response))
}

/// The caller's own account.
pub async fn profile(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<User>> {
    let user = AuthService::new(state.store(), state.jwt())
        .profile(user.id)
        .await?;
    Ok(Json(user))
}
