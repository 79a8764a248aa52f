//! Source (crawl target) database operations

use smithers_common::db::{AdapterKind, NewSource, Source, SourceFilter, SourceStatus};
use smithers_common::time;
use smithers_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

fn row_to_source(row: &SqliteRow) -> Result<Source> {
    let guid: String = row.get("guid");
    let id = Uuid::parse_str(&guid)
        .map_err(|e| Error::Internal(format!("Invalid source guid '{}': {}", guid, e)))?;

    let adapter: String = row.get("adapter");
    let last_success: Option<i64> = row.get("last_success");
    let last_attempted_on: Option<String> = row.get("last_attempted_on");

    Ok(Source {
        id,
        name: row.get("name"),
        adapter: AdapterKind::from(adapter),
        external_ref: row.get("external_ref"),
        last_success: last_success.map(|v| v != 0),
        last_attempted_on: last_attempted_on
            .as_deref()
            .map(time::from_storage)
            .transpose()?,
    })
}

/// List sources matching `filter`, ordered by name
pub async fn list_sources(pool: &SqlitePool, filter: &SourceFilter) -> Result<Vec<Source>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, name, adapter, external_ref, last_success, last_attempted_on
        FROM sources
        ORDER BY name, guid
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut sources = Vec::with_capacity(rows.len());
    for row in &rows {
        let source = row_to_source(row)?;
        if filter.matches(&source) {
            sources.push(source);
        }
    }

    Ok(sources)
}

/// Load one source by id
pub async fn load_source(pool: &SqlitePool, id: Uuid) -> Result<Option<Source>> {
    let row = sqlx::query(
        r#"
        SELECT guid, name, adapter, external_ref, last_success, last_attempted_on
        FROM sources
        WHERE guid = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_source).transpose()
}

/// Register a new source
pub async fn insert_source(pool: &SqlitePool, source: &NewSource) -> Result<Source> {
    if source.name.trim().is_empty() {
        return Err(Error::InvalidInput("source name must not be empty".to_string()));
    }
    if source.external_ref.trim().is_empty() {
        return Err(Error::InvalidInput(
            "source external reference must not be empty".to_string(),
        ));
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO sources (guid, name, adapter, external_ref)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(source.name.trim())
    .bind(source.adapter.as_str())
    .bind(source.external_ref.trim())
    .execute(pool)
    .await?;

    load_source(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Source {} missing after insert", id)))
}

/// Record the outcome of a crawl attempt
pub async fn update_source_status(pool: &SqlitePool, id: Uuid, status: &SourceStatus) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE sources
        SET last_success = ?, last_attempted_on = ?
        WHERE guid = ?
        "#,
    )
    .bind(status.success)
    .bind(time::to_storage(&status.last_attempted_on))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("source {}", id)));
    }

    Ok(())
}
