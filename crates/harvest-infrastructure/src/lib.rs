// SPDX-License-Identifier: GPL-3.0-or-later
pub mod catalog;
pub mod checkpoint;
pub mod repositories;

pub use catalog::{load_catalog, read_catalog, CatalogError};
pub use checkpoint::{import_legacy_csv, write_preview_index, SqliteCheckpointStore};
pub use repositories::CheckpointRepository;

use anyhow::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Rewrite a `sqlite://` URL so the file can be created on any platform.
///
/// Relative paths become absolute, the parent directory is created and
/// `mode=rwc` is appended. In-memory and non-file URLs pass through.
pub fn prepare_database_url(database_url: &str) -> Result<String> {
    if !database_url.starts_with("sqlite://") || database_url.starts_with("sqlite://:memory:") {
        return Ok(database_url.to_string());
    }

    let db_path = database_url.trim_start_matches("sqlite://");
    let path = Path::new(db_path);

    // Create parent directory if needed
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
            info!(target: "infrastructure", path = %parent.display(), "created database directory");
        }
    }

    let absolute_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    // SQLite accepts forward slashes on all platforms
    let path_str = absolute_path.to_string_lossy().replace('\\', "/");

    Ok(format!("sqlite://{}?mode=rwc", path_str))
}

/// Open the checkpoint database and apply migrations.
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    info!(target: "infrastructure", "initializing database");

    let db_url = prepare_database_url(database_url)?;
    info!(target: "infrastructure", db_url = %db_url, "connecting to database");

    // The harvester is strictly sequential; one connection also keeps
    // `sqlite::memory:` databases coherent.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&db_url)
        .await?;

    info!(target: "infrastructure", db_url = %database_url, "running migrations");
    sqlx::migrate!("../../migrations").run(&pool).await?;

    info!(target: "infrastructure", "database initialized successfully");
    Ok(pool)
}
