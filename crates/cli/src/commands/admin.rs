//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! stitchery admin create -e admin@example.com -n "Admin Name" -p "long password"
//! ```
//!
//! Admin accounts cannot be created over HTTP; self-registration always
//! yields a customer.

use stitchery_storefront::db::PgStore;
use stitchery_storefront::models::User;
use stitchery_storefront::services::auth::{AuthError, create_admin};
use thiserror::Error;

use super::{CommandError, connect};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Create a new admin user.
pub async fn create_user(
    email: &str,
    name: Option<&str>,
    password: &str,
) -> Result<User, AdminError> {
    let store = PgStore::new(connect().await?);

    tracing::info!("Creating admin user: {}", email);
    let user = create_admin(&store, email, name, password).await?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Email: {}",
        user.id,
        user.email
    );
    Ok(user)
}
