//! User administration.
//!
//! Admins may read and change any account; a user may read and change
//! their own.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use stitchery_core::UserId;

use crate::error::{AppError, Result};
use crate::middleware::{CurrentUser, RequireAdmin, RequireUser};
use crate::models::User;
use crate::services::UserService;
use crate::routes::Message;
use crate::services::users::UserUpdate;
use crate::state::AppState;

fn ensure_access(user: &CurrentUser, id: UserId) -> Result<()> {
    if user.can_access(id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You can only access your own account".to_string(),
        ))
    }
}

/// All users.
pub async fn index(State(state): State<AppState>, _admin: RequireAdmin) -> Result<Json<Vec<User>>> {
    Ok(Json(UserService::new(state.store()).find_all().await?))
}

/// One user.
pub async fn show(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<UserId>,
) -> Result<Json<User>> {
    ensure_access(&user, id)?;
    Ok(Json(UserService::new(state.store()).find_one(id).await?))
}

/// Change email, name or password.
#[instrument(skip(state, user, input), fields(user_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<UserId>,
    Json(input): Json<UserUpdate>,
) -> Result<Json<User>> {
    ensure_access(&user, id)?;
    Ok(Json(UserService::new(state.store()).update(id, input).await?))
}

/// Delete a user.
#[instrument(skip(state, _admin), fields(user_id = %id))]
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<UserId>,
) -> Result<Json<Message>> {
    UserService::new(state.store()).remove(id).await?;
    Ok(Json(Message {
        message: "User deleted successfully".to_string(),
    }))
}
