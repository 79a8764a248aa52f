//! SQLite test database helpers

use smithers_common::db::{init_database, AdapterKind, NewSource, Source};
use smithers_crawl::SqliteStore;
use tempfile::TempDir;

/// Fresh store on a temporary database file
///
/// Keep the returned `TempDir` alive for the duration of the test.
pub async fn create_test_store() -> (TempDir, SqliteStore) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("smithers.db"))
        .await
        .unwrap();
    (temp_dir, SqliteStore::new(pool))
}

pub async fn seed_source(store: &SqliteStore, name: &str, adapter: AdapterKind) -> Source {
    store
        .add_source(&NewSource {
            name: name.to_string(),
            adapter,
            external_ref: format!("{}-ref", name.to_lowercase()),
        })
        .await
        .unwrap()
}
