//! Update record database operations

use smithers_common::db::{FetchedUpdate, UpdatePatch, UpdateRecord};
use smithers_common::float::precision_key;
use smithers_common::time;
use smithers_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

fn parse_guid(value: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Invalid {} '{}': {}", column, value, e)))
}

fn row_to_record(row: &SqliteRow) -> Result<UpdateRecord> {
    let guid: String = row.get("guid");
    let source_guid: String = row.get("source_guid");
    let observed_on: String = row.get("observed_on");
    let read_at: Option<String> = row.get("read_at");

    Ok(UpdateRecord {
        id: parse_guid(&guid, "guid")?,
        source_id: parse_guid(&source_guid, "source_guid")?,
        origin_id: row.get("origin_id"),
        chapter: row.get("chapter"),
        chapter_name: row.get("chapter_name"),
        observed_on: time::from_storage(&observed_on)?,
        read_at: read_at.as_deref().map(time::from_storage).transpose()?,
    })
}

/// List all update records of one source
pub async fn list_update_records(pool: &SqlitePool, source_id: Uuid) -> Result<Vec<UpdateRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, source_guid, origin_id, chapter, chapter_name, observed_on, read_at
        FROM update_records
        WHERE source_guid = ?
        ORDER BY chapter, created_at
        "#,
    )
    .bind(source_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_record).collect()
}

/// Load one update record by id
pub async fn load_update_record(pool: &SqlitePool, id: Uuid) -> Result<Option<UpdateRecord>> {
    let row = sqlx::query(
        r#"
        SELECT guid, source_guid, origin_id, chapter, chapter_name, observed_on, read_at
        FROM update_records
        WHERE guid = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_record).transpose()
}

/// Insert a fetched update, assigning a new id
///
/// `precision` determines the uniqueness key of the chapter number.
pub async fn insert_update_record(
    pool: &SqlitePool,
    update: &FetchedUpdate,
    precision: u32,
) -> Result<UpdateRecord> {
    let record = UpdateRecord {
        id: Uuid::new_v4(),
        source_id: update.source_id,
        origin_id: update.origin_id.clone(),
        chapter: update.chapter,
        chapter_name: update.chapter_name.clone(),
        observed_on: update.observed_on,
        read_at: update.read_at,
    };

    sqlx::query(
        r#"
        INSERT INTO update_records (
            guid, source_guid, origin_id, chapter, chapter_key,
            chapter_name, observed_on, read_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.source_id.to_string())
    .bind(&record.origin_id)
    .bind(record.chapter)
    .bind(precision_key(record.chapter, precision))
    .bind(&record.chapter_name)
    .bind(time::to_storage(&record.observed_on))
    .bind(record.read_at.as_ref().map(time::to_storage))
    .execute(pool)
    .await?;

    Ok(record)
}

/// Apply a partial update to the mutable fields of a record
///
/// Fields absent from the patch keep their stored value.
pub async fn update_update_record(
    pool: &SqlitePool,
    id: Uuid,
    patch: &UpdatePatch,
) -> Result<UpdateRecord> {
    let result = sqlx::query(
        r#"
        UPDATE update_records
        SET observed_on = COALESCE(?, observed_on),
            chapter_name = COALESCE(?, chapter_name),
            read_at = COALESCE(?, read_at),
            updated_at = CURRENT_TIMESTAMP
        WHERE guid = ?
        "#,
    )
    .bind(patch.observed_on.as_ref().map(time::to_storage))
    .bind(patch.chapter_name.as_deref())
    .bind(patch.read_at.as_ref().map(time::to_storage))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("update record {}", id)));
    }

    load_update_record(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("update record {}", id)))
}
