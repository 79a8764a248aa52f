//! Adapter returning canned results

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use smithers_common::db::{AdapterKind, FetchedUpdate, Source};
use smithers_crawl::{AdapterError, FetchOptions, UpdateAdapter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

enum Script {
    Updates(Vec<FetchedUpdate>),
    Fail(String),
}

/// Serves scripted results keyed by source id
pub struct ScriptedAdapter {
    kind: AdapterKind,
    scripts: Mutex<HashMap<Uuid, Script>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    fetch_delay: Duration,
}

impl ScriptedAdapter {
    pub fn new(kind: AdapterKind) -> Self {
        Self {
            kind,
            scripts: Mutex::new(HashMap::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            fetch_delay: Duration::ZERO,
        }
    }

    pub fn returns(self, source_id: Uuid, updates: Vec<FetchedUpdate>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(source_id, Script::Updates(updates));
        self
    }

    pub fn fails(self, source_id: Uuid, message: &str) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(source_id, Script::Fail(message.to_string()));
        self
    }

    /// Hold every fetch open for `delay`
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Counter of the most fetches seen running at once; stays readable
    /// after the adapter moves into a dispatch
    pub fn peak_in_flight(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.peak_in_flight)
    }
}

#[async_trait]
impl UpdateAdapter for ScriptedAdapter {
    fn kind(&self) -> AdapterKind {
        self.kind.clone()
    }

    async fn fetch(
        &self,
        source: &Source,
        _options: FetchOptions,
    ) -> Result<Vec<FetchedUpdate>, AdapterError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if self.fetch_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.fetch_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let result = match self.scripts.lock().unwrap().get(&source.id) {
            Some(Script::Updates(updates)) => Ok(updates.clone()),
            Some(Script::Fail(message)) => Err(AdapterError::Network(message.clone())),
            None => Ok(Vec::new()),
        };
        result
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Fetched update for `source_id` observed `observed` seconds after a fixed epoch
pub fn update(source_id: Uuid, origin: &str, chapter: f64, observed: i64) -> FetchedUpdate {
    FetchedUpdate {
        source_id,
        origin_id: origin.to_string(),
        chapter,
        chapter_name: format!("Ch.{}", chapter),
        observed_on: at(observed),
        read_at: None,
    }
}
