//! Database initialization
//!
//! Creates the database file on first run and the crawler tables on every
//! start (idempotent).

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (or create) the database and make sure every table exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Writes arrive from the write queue in bursts; keep enough connections
    // that queued writes are not also serialized on pool acquisition
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all crawler tables on an already-open pool
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    create_sources_table(pool).await?;
    create_update_records_table(pool).await?;
    create_failure_log_table(pool).await?;

    Ok(())
}

/// Create the sources table (crawl targets)
pub async fn create_sources_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            adapter TEXT NOT NULL,
            external_ref TEXT NOT NULL,
            last_success INTEGER,
            last_attempted_on TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the update_records table
///
/// `chapter_key` is the chapter number rounded at the crawl precision and
/// scaled to an integer; together with source and origin id it identifies
/// one logical chapter.
pub async fn create_update_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS update_records (
            guid TEXT PRIMARY KEY,
            source_guid TEXT NOT NULL REFERENCES sources(guid) ON DELETE CASCADE,
            origin_id TEXT NOT NULL,
            chapter REAL NOT NULL,
            chapter_key INTEGER NOT NULL,
            chapter_name TEXT NOT NULL,
            observed_on TEXT NOT NULL,
            read_at TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (source_guid, origin_id, chapter_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_update_records_source ON update_records(source_guid)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the failure_log table for run-fatal errors
pub async fn create_failure_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS failure_log (
            guid TEXT PRIMARY KEY,
            message TEXT NOT NULL,
            context TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
