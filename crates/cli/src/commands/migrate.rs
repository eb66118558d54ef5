//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! stitchery migrate
//! ```
//!
//! Migrations live in `crates/storefront/migrations/` and are embedded in the
//! storefront crate at build time.

use stitchery_storefront::db::postgres::MIGRATOR;
use thiserror::Error;

use super::{CommandError, connect};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run storefront database migrations.
pub async fn storefront() -> Result<(), MigrationError> {
    let pool = connect().await?;

    tracing::info!(
        migrations = MIGRATOR.iter().count(),
        "Running storefront migrations..."
    );
    MIGRATOR.run(&pool).await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}
