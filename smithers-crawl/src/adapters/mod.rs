//! Source adapters
//!
//! An adapter turns one tracked series on an external site into a list of
//! [`FetchedUpdate`]s. Adapters are dispatched by [`AdapterKind`] and always
//! run inside their kind's fetch queue (see [`dispatch`]).

pub mod dispatch;
pub mod mangadex;
pub mod webtoon;

pub use dispatch::{AdapterDispatch, FetchJob};
pub use mangadex::MangadexAdapter;
pub use webtoon::WebtoonAdapter;

use smithers_common::db::{AdapterKind, FetchedUpdate, Source};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("smithers-crawl/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Adapter errors
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Series not found: {0}")]
    NotFound(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// Source's external reference is unusable for this adapter
    #[error("Invalid series reference '{0}'")]
    InvalidReference(String),
}

/// Options passed to every fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Return only the most recent chapter
    pub only_latest: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self { only_latest: true }
    }
}

/// Fetch routine for one adapter kind
#[async_trait::async_trait]
pub trait UpdateAdapter: Send + Sync {
    /// Adapter kind this implementation serves
    fn kind(&self) -> AdapterKind;

    /// Fetch the chapters currently published for `source`
    async fn fetch(
        &self,
        source: &Source,
        options: FetchOptions,
    ) -> Result<Vec<FetchedUpdate>, AdapterError>;
}

/// Keep only the highest chapter (first one wins on ties)
pub fn retain_latest(updates: Vec<FetchedUpdate>) -> Vec<FetchedUpdate> {
    let mut latest: Option<FetchedUpdate> = None;
    for update in updates {
        let newer = match &latest {
            Some(current) => update.chapter.total_cmp(&current.chapter).is_gt(),
            None => true,
        };
        if newer {
            latest = Some(update);
        }
    }
    latest.into_iter().collect()
}

/// Shared HTTP client for adapters
pub fn build_http_client() -> Result<reqwest::Client, AdapterError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| AdapterError::Network(e.to_string()))
}

/// Request rate limiter of one adapter
///
/// The fetch queue bounds how many sources of a kind are crawled at once;
/// this bounds request rate within a paginated crawl.
pub(crate) type Pacer = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Limiter allowing one request per `min_interval`
pub(crate) fn request_pacer(min_interval: Duration) -> Pacer {
    let quota = Quota::with_period(min_interval)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
    RateLimiter::direct(quota)
}

/// Map a non-success HTTP status to an adapter error
pub(crate) async fn check_status(
    response: reqwest::Response,
    series: &str,
) -> Result<reqwest::Response, AdapterError> {
    let status = response.status();

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(AdapterError::NotFound(series.to_string()));
    }

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(AdapterError::Api(status.as_u16(), error_text));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn update(origin: &str, chapter: f64) -> FetchedUpdate {
        FetchedUpdate {
            source_id: Uuid::nil(),
            origin_id: origin.to_string(),
            chapter,
            chapter_name: format!("Ch.{}", chapter),
            observed_on: Utc::now(),
            read_at: None,
        }
    }

    #[test]
    fn test_retain_latest_picks_highest_chapter() {
        let latest = retain_latest(vec![update("a", 3.0), update("b", 10.5), update("c", 7.0)]);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].origin_id, "b");
    }

    #[test]
    fn test_retain_latest_first_wins_on_tie() {
        let latest = retain_latest(vec![update("a", 4.0), update("b", 4.0)]);
        assert_eq!(latest[0].origin_id, "a");
    }

    #[test]
    fn test_retain_latest_empty() {
        assert!(retain_latest(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_pacer_spaces_requests() {
        let pacer = request_pacer(Duration::from_millis(40));
        let start = std::time::Instant::now();
        pacer.until_ready().await;
        pacer.until_ready().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_pacer_allows_single_request_per_period() {
        let pacer = request_pacer(Duration::from_secs(60));
        assert!(pacer.check().is_ok());
        assert!(pacer.check().is_err());
    }
}
