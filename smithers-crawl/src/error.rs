//! Error types for smithers-crawl
//!
//! Errors raised inside one source's pipeline are wrapped in a
//! [`SourceFailure`] so the orchestrator can attribute them. Anything that
//! escapes that scope is run-fatal.

use crate::adapters::AdapterError;
use thiserror::Error;
use uuid::Uuid;

/// Crawl error type
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Source declares an adapter kind this build cannot dispatch
    #[error("Unknown adapter '{adapter}' found for source '{source_name}'")]
    UnknownAdapter { source_name: String, adapter: String },

    /// Adapter fetch failed
    #[error("Fetch failed: {0}")]
    Adapter(#[from] AdapterError),

    /// More than one stored record claims the same logical chapter
    #[error("Ambiguous match for origin '{origin_id}' chapter {chapter}: {candidates} stored records")]
    AmbiguousMatch {
        origin_id: String,
        chapter: f64,
        candidates: usize,
    },

    /// Storage or configuration error from smithers-common
    #[error(transparent)]
    Common(#[from] smithers_common::Error),
}

impl CrawlError {
    /// Error class used in log output
    pub fn category(&self) -> &'static str {
        match self {
            CrawlError::UnknownAdapter { .. } => "configuration",
            CrawlError::Adapter(_) => "fetch",
            CrawlError::AmbiguousMatch { .. } => "data_integrity",
            CrawlError::Common(smithers_common::Error::Config(_)) => "configuration",
            CrawlError::Common(smithers_common::Error::DataIntegrity(_)) => "data_integrity",
            CrawlError::Common(_) => "storage",
        }
    }
}

/// Error attributed to one source
#[derive(Debug, Error)]
#[error("source '{source_name}' ({source_id}) failed: {error}")]
pub struct SourceFailure {
    pub source_id: Uuid,
    pub source_name: String,
    #[source]
    pub error: CrawlError,
}

/// Result type for crawl operations
pub type CrawlResult<T> = Result<T, CrawlError>;
