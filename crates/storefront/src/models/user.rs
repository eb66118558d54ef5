//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use stitchery_core::{Email, UserId};

/// A storefront user.
///
/// The password hash is not a field; it is only ever read
/// alongside the user for login verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Normalized email address.
    pub email: Email,
    /// Optional display name.
    pub name: Option<String>,
    /// Whether the user may use admin endpoints.
    #[serde(rename = "is_admin")]
    pub is_admin: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Minimal user projection attached to orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub email: Email,
    pub name: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

/// Insert payload for a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub name: Option<String>,
    pub password_hash: String,
    pub is_admin: bool,
}

/// Partial update for a user. `is_admin` is not updatable.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<Email>,
    pub name: Option<String>,
    pub password_hash: Option<String>,
}
