pub mod migrations;
pub mod schema;

pub use migrations::*;
pub use schema::*;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use tracing::{info, instrument};

use crate::error::AppError;

/// Opens the SQLite file, creating it and its parent directory when missing.
#[instrument]
pub async fn connect_pool(path: &Path) -> Result<SqlitePool, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    info!("Connected to SQLite database");
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<SchemaChanges, AppError> {
    DeclarativeMigrator::new(pool.clone(), CURRENT_SCHEMA)
        .migrate()
        .await
}

/// Refuses to serve a database whose schema differs from [`CURRENT_SCHEMA`].
pub async fn ensure_schema_current(pool: &SqlitePool) -> Result<(), AppError> {
    let changes = DeclarativeMigrator::new(pool.clone(), CURRENT_SCHEMA)
        .plan()
        .await?;

    if changes.is_empty() {
        info!("Database schema is current");
        return Ok(());
    }

    Err(AppError::Internal(format!(
        "Database schema is out of date, run `ham-rollcall-migrate` first:\n{}",
        changes
    )))
}

/// Folds the write-ahead log back into the main database file, so that a copy
/// of the file alone is complete.
pub async fn checkpoint_wal(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
        .execute(pool)
        .await?;
    Ok(())
}
