//! Failure log for run-fatal errors

use smithers_common::db::FailureLogEntry;
use smithers_common::time;
use smithers_common::Result;
use sqlx::{Row, SqlitePool};

/// Append one entry
pub async fn append_failure_log(pool: &SqlitePool, entry: &FailureLogEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO failure_log (guid, message, context, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(&entry.message)
    .bind(entry.context.as_deref())
    .bind(time::to_storage(&entry.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent entries first
pub async fn recent_failures(pool: &SqlitePool, limit: i64) -> Result<Vec<FailureLogEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, message, context, created_at
        FROM failure_log
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let guid: String = row.get("guid");
            let created_at: String = row.get("created_at");
            Ok(FailureLogEntry {
                id: uuid::Uuid::parse_str(&guid).map_err(|e| {
                    smithers_common::Error::Internal(format!("Invalid failure log guid: {}", e))
                })?,
                message: row.get("message"),
                context: row.get("context"),
                created_at: time::from_storage(&created_at)?,
            })
        })
        .collect()
}
