//! User administration.

use serde::Deserialize;
use tracing::instrument;

use stitchery_core::{Email, UserId};

use crate::db::{RepositoryError, Store};
use crate::models::{User, UserChanges};
use crate::services::auth::{AuthError, hash_password, validate_name, validate_password};

/// Body of an update-user request. Admin status cannot be changed here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

/// User account operations.
pub struct UserService<'a> {
    store: &'a dyn Store,
}

impl<'a> UserService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// All users, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if storage fails.
    pub async fn find_all(&self) -> Result<Vec<User>, AuthError> {
        Ok(self.store.list_users().await?)
    }

    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if no such user exists.
    pub async fn find_one(&self, id: UserId) -> Result<User, AuthError> {
        self.store
            .get_user(id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Apply a partial update. A new password is re-hashed; a new email must
    /// still be unique.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound`, `AuthError::UserAlreadyExists`, or a
    /// validation error for the changed fields.
    #[instrument(skip(self, input), fields(user_id = %id))]
    pub async fn update(&self, id: UserId, input: UserUpdate) -> Result<User, AuthError> {
        let email = input.email.as_deref().map(Email::parse).transpose()?;
        let name = validate_name(input.name.as_deref())?;
        let password_hash = match input.password.as_deref() {
            Some(password) => {
                validate_password(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let user = self
            .store
            .update_user(
                id,
                UserChanges {
                    email,
                    name,
                    password_hash,
                },
            )
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::UserNotFound,
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!("User updated");
        Ok(user)
    }

    /// Delete a user and their cart.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if no such user exists, or
    /// `AuthError::Repository` with a conflict while the user has orders.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn remove(&self, id: UserId) -> Result<(), AuthError> {
        if self.store.delete_user(id).await? {
            tracing::info!("User deleted");
            Ok(())
        } else {
            Err(AuthError::UserNotFound)
        }
    }
}
