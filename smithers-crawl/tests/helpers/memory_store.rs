//! In-memory `UpdateStore` with failure injection

use async_trait::async_trait;
use smithers_common::db::{
    AdapterKind, FailureLogEntry, FetchedUpdate, Source, SourceFilter, SourceStatus, UpdatePatch,
    UpdateRecord,
};
use smithers_common::{Error, Result};
use smithers_crawl::UpdateStore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct State {
    sources: Vec<Source>,
    records: Vec<UpdateRecord>,
    failure_log: Vec<FailureLogEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_list_sources: AtomicBool,
    fail_failure_log: AtomicBool,
    fail_status_writes: AtomicBool,
    /// Inserts of these origin ids fail
    failing_origins: Mutex<Vec<String>>,
    /// Delay applied inside every record write
    write_delay: Mutex<Option<Duration>>,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    writes_in_flight: AtomicUsize,
    peak_writes_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&self, name: &str, adapter: AdapterKind) -> Source {
        let source = Source {
            id: Uuid::new_v4(),
            name: name.to_string(),
            adapter,
            external_ref: format!("{}-ref", name),
            last_success: None,
            last_attempted_on: None,
        };
        self.state.lock().unwrap().sources.push(source.clone());
        source
    }

    pub fn seed_record(&self, record: UpdateRecord) {
        self.state.lock().unwrap().records.push(record);
    }

    pub fn source(&self, id: Uuid) -> Source {
        self.state
            .lock()
            .unwrap()
            .sources
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .expect("source exists")
    }

    pub fn records(&self, source_id: Uuid) -> Vec<UpdateRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.source_id == source_id)
            .cloned()
            .collect()
    }

    pub fn failure_log(&self) -> Vec<FailureLogEntry> {
        self.state.lock().unwrap().failure_log.clone()
    }

    pub fn fail_list_sources(&self) {
        self.fail_list_sources.store(true, Ordering::SeqCst);
    }

    pub fn fail_failure_log(&self) {
        self.fail_failure_log.store(true, Ordering::SeqCst);
    }

    pub fn fail_status_writes(&self) {
        self.fail_status_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_insert_of(&self, origin_id: &str) {
        self.failing_origins
            .lock()
            .unwrap()
            .push(origin_id.to_string());
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = Some(delay);
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.insert_count() + self.update_count()
    }

    pub fn peak_writes_in_flight(&self) -> usize {
        self.peak_writes_in_flight.load(Ordering::SeqCst)
    }

    async fn enter_write(&self) {
        let now = self.writes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_writes_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.write_delay.lock().unwrap();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
    }

    fn exit_write(&self) {
        self.writes_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UpdateStore for MemoryStore {
    async fn list_sources(&self, filter: &SourceFilter) -> Result<Vec<Source>> {
        if self.fail_list_sources.load(Ordering::SeqCst) {
            return Err(Error::Internal("source listing unavailable".to_string()));
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .sources
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn list_update_records(&self, source_id: Uuid) -> Result<Vec<UpdateRecord>> {
        Ok(self.records(source_id))
    }

    async fn insert_update_record(&self, update: FetchedUpdate) -> Result<UpdateRecord> {
        self.enter_write().await;
        if self
            .failing_origins
            .lock()
            .unwrap()
            .contains(&update.origin_id)
        {
            self.exit_write();
            return Err(Error::Internal(format!(
                "insert of {} rejected",
                update.origin_id
            )));
        }
        let record = UpdateRecord {
            id: Uuid::new_v4(),
            source_id: update.source_id,
            origin_id: update.origin_id,
            chapter: update.chapter,
            chapter_name: update.chapter_name,
            observed_on: update.observed_on,
            read_at: update.read_at,
        };
        self.state.lock().unwrap().records.push(record.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.exit_write();
        Ok(record)
    }

    async fn update_update_record(&self, id: Uuid, patch: UpdatePatch) -> Result<UpdateRecord> {
        self.enter_write().await;
        let result = {
            let mut state = self.state.lock().unwrap();
            match state.records.iter_mut().find(|r| r.id == id) {
                Some(record) => {
                    patch.apply_to(record);
                    Ok(record.clone())
                }
                None => Err(Error::NotFound(format!("update record {}", id))),
            }
        };
        if result.is_ok() {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
        self.exit_write();
        result
    }

    async fn update_source_status(&self, id: Uuid, status: SourceStatus) -> Result<()> {
        if self.fail_status_writes.load(Ordering::SeqCst) && !status.success {
            return Err(Error::Internal("status write unavailable".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let source = state
            .sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("source {}", id)))?;
        source.last_success = Some(status.success);
        source.last_attempted_on = Some(status.last_attempted_on);
        Ok(())
    }

    async fn append_failure_log(&self, entry: FailureLogEntry) -> Result<()> {
        if self.fail_failure_log.load(Ordering::SeqCst) {
            return Err(Error::Internal("failure log unavailable".to_string()));
        }
        self.state.lock().unwrap().failure_log.push(entry);
        Ok(())
    }
}
