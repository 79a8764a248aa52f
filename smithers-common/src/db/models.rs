//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Adapter used to fetch a source's updates
///
/// Values not known to this build are kept verbatim in `Unsupported` so that
/// listing sources never fails; dispatch rejects them per source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AdapterKind {
    Webtoon,
    Mangadex,
    Unsupported(String),
}

impl AdapterKind {
    pub fn as_str(&self) -> &str {
        match self {
            AdapterKind::Webtoon => "webtoon",
            AdapterKind::Mangadex => "mangadex",
            AdapterKind::Unsupported(name) => name,
        }
    }

    /// Every adapter kind this build can crawl
    pub fn supported() -> [AdapterKind; 2] {
        [AdapterKind::Webtoon, AdapterKind::Mangadex]
    }
}

impl From<&str> for AdapterKind {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "webtoon" => AdapterKind::Webtoon,
            "mangadex" => AdapterKind::Mangadex,
            _ => AdapterKind::Unsupported(value.to_string()),
        }
    }
}

impl From<String> for AdapterKind {
    fn from(value: String) -> Self {
        AdapterKind::from(value.as_str())
    }
}

impl From<AdapterKind> for String {
    fn from(kind: AdapterKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crawl target: one tracked series on one external site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub adapter: AdapterKind,
    /// Adapter-specific series identifier (MangaDex manga id, Webtoon title_no)
    pub external_ref: String,
    /// Outcome of the last attempted crawl, None if never crawled
    pub last_success: Option<bool>,
    pub last_attempted_on: Option<DateTime<Utc>>,
}

/// Fields required to register a new source
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub adapter: AdapterKind,
    pub external_ref: String,
}

/// Restricts which sources a run lists
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    /// Only these ids (empty = all)
    pub source_ids: Vec<Uuid>,
    pub adapter: Option<AdapterKind>,
}

impl SourceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, source: &Source) -> bool {
        if !self.source_ids.is_empty() && !self.source_ids.contains(&source.id) {
            return false;
        }
        match &self.adapter {
            Some(kind) => &source.adapter == kind,
            None => true,
        }
    }
}

/// Outcome recorded on a source at the end of its pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStatus {
    pub success: bool,
    pub last_attempted_on: DateTime<Utc>,
}

/// Persisted observation of one chapter release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub id: Uuid,
    pub source_id: Uuid,
    /// Identifier the source uses for this logical chapter
    pub origin_id: String,
    pub chapter: f64,
    pub chapter_name: String,
    pub observed_on: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Update record as produced by an adapter, before storage assigns an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedUpdate {
    pub source_id: Uuid,
    pub origin_id: String,
    pub chapter: f64,
    pub chapter_name: String,
    pub observed_on: DateTime<Utc>,
    /// Read marker reported by the source. None means the adapter does not
    /// track read state, so any stored marker is left untouched.
    pub read_at: Option<DateTime<Utc>>,
}

/// Partial update of the mutable fields of an update record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePatch {
    pub observed_on: Option<DateTime<Utc>>,
    pub chapter_name: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
}

impl UpdatePatch {
    pub fn is_empty(&self) -> bool {
        self.observed_on.is_none() && self.chapter_name.is_none() && self.read_at.is_none()
    }

    /// Names of the fields this patch writes, for logging
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.observed_on.is_some() {
            fields.push("observed_on");
        }
        if self.chapter_name.is_some() {
            fields.push("chapter_name");
        }
        if self.read_at.is_some() {
            fields.push("read_at");
        }
        fields
    }

    pub fn apply_to(&self, record: &mut UpdateRecord) {
        if let Some(observed_on) = self.observed_on {
            record.observed_on = observed_on;
        }
        if let Some(name) = &self.chapter_name {
            record.chapter_name = name.clone();
        }
        if let Some(read_at) = self.read_at {
            record.read_at = Some(read_at);
        }
    }
}

/// Persisted record of a run-fatal error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureLogEntry {
    pub id: Uuid,
    pub message: String,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FailureLogEntry {
    pub fn new(message: impl Into<String>, context: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: message.into(),
            context,
            created_at: Utc::now(),
        }
    }
}
