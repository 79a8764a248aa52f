//! Storage for the crawler
//!
//! The orchestrator and reconciliation engine only see [`UpdateStore`];
//! [`SqliteStore`] is the production implementation over the shared SQLite
//! database.

pub mod failure_log;
pub mod sources;
pub mod updates;

use async_trait::async_trait;
use smithers_common::db::{
    FailureLogEntry, FetchedUpdate, NewSource, Source, SourceFilter, SourceStatus, UpdatePatch,
    UpdateRecord,
};
use smithers_common::float::DEFAULT_CHAPTER_PRECISION;
use smithers_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Storage operations consumed by a crawl run
#[async_trait]
pub trait UpdateStore: Send + Sync {
    async fn list_sources(&self, filter: &SourceFilter) -> Result<Vec<Source>>;

    async fn list_update_records(&self, source_id: Uuid) -> Result<Vec<UpdateRecord>>;

    /// Persist a fetched update; storage assigns the id
    async fn insert_update_record(&self, update: FetchedUpdate) -> Result<UpdateRecord>;

    async fn update_update_record(&self, id: Uuid, patch: UpdatePatch) -> Result<UpdateRecord>;

    async fn update_source_status(&self, id: Uuid, status: SourceStatus) -> Result<()>;

    /// Record a run-fatal error
    async fn append_failure_log(&self, entry: FailureLogEntry) -> Result<()>;
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    chapter_precision: u32,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_precision(pool, DEFAULT_CHAPTER_PRECISION)
    }

    /// `chapter_precision` must match the precision used for matching
    pub fn with_precision(pool: SqlitePool, chapter_precision: u32) -> Self {
        Self {
            pool,
            chapter_precision,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn add_source(&self, source: &NewSource) -> Result<Source> {
        sources::insert_source(&self.pool, source).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl UpdateStore for SqliteStore {
    async fn list_sources(&self, filter: &SourceFilter) -> Result<Vec<Source>> {
        sources::list_sources(&self.pool, filter).await
    }

    async fn list_update_records(&self, source_id: Uuid) -> Result<Vec<UpdateRecord>> {
        updates::list_update_records(&self.pool, source_id).await
    }

    async fn insert_update_record(&self, update: FetchedUpdate) -> Result<UpdateRecord> {
        updates::insert_update_record(&self.pool, &update, self.chapter_precision).await
    }

    async fn update_update_record(&self, id: Uuid, patch: UpdatePatch) -> Result<UpdateRecord> {
        updates::update_update_record(&self.pool, id, &patch).await
    }

    async fn update_source_status(&self, id: Uuid, status: SourceStatus) -> Result<()> {
        sources::update_source_status(&self.pool, id, &status).await
    }

    async fn append_failure_log(&self, entry: FailureLogEntry) -> Result<()> {
        failure_log::append_failure_log(&self.pool, &entry).await
    }
}
