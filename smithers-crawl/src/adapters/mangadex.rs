//! MangaDex chapter feed adapter
//!
//! Reads `/manga/{id}/feed` ordered by chapter descending. A source's
//! `external_ref` is the MangaDex manga UUID.

use super::{check_status, request_pacer, AdapterError, FetchOptions, Pacer, UpdateAdapter};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use smithers_common::db::{AdapterKind, FetchedUpdate, Source};
use std::time::Duration;
use uuid::Uuid;

const MANGADEX_BASE_URL: &str = "https://api.mangadex.org";
const PAGE_SIZE: usize = 100;
const MIN_REQUEST_INTERVAL_MS: u64 = 250;
const TRANSLATED_LANGUAGE: &str = "en";

/// Feed response envelope
#[derive(Debug, Deserialize)]
struct FeedResponse {
    data: Vec<FeedChapter>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct FeedChapter {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterAttributes {
    /// Chapter number as text ("12", "12.5"); absent for oneshots
    chapter: Option<String>,
    title: Option<String>,
    publish_at: DateTime<Utc>,
}

/// MangaDex API adapter
pub struct MangadexAdapter {
    http_client: reqwest::Client,
    base_url: String,
    pacer: Pacer,
}

impl MangadexAdapter {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self::with_base_url(http_client, MANGADEX_BASE_URL)
    }

    /// Point the adapter at another API host
    pub fn with_base_url(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pacer: request_pacer(Duration::from_millis(MIN_REQUEST_INTERVAL_MS)),
        }
    }

    async fn fetch_page(
        &self,
        manga_id: &Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<FeedResponse, AdapterError> {
        self.pacer.until_ready().await;

        let url = format!("{}/manga/{}/feed", self.base_url, manga_id);
        tracing::debug!(manga_id = %manga_id, offset, "Querying MangaDex feed");

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("translatedLanguage[]", TRANSLATED_LANGUAGE.to_string()),
                ("order[chapter]", "desc".to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        let response = check_status(response, &manga_id.to_string()).await?;
        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        parse_feed(&body)
    }
}

fn parse_feed(body: &str) -> Result<FeedResponse, AdapterError> {
    serde_json::from_str(body).map_err(|e| AdapterError::Parse(e.to_string()))
}

/// Convert feed chapters into updates, skipping entries without a chapter number
fn to_updates(source_id: Uuid, chapters: Vec<FeedChapter>) -> Vec<FetchedUpdate> {
    chapters
        .into_iter()
        .filter_map(|entry| {
            let raw = entry.attributes.chapter.as_deref()?.trim().to_string();
            let chapter = match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => value,
                _ => {
                    tracing::debug!(chapter_id = %entry.id, chapter = %raw, "Skipping non-numeric chapter");
                    return None;
                }
            };

            let chapter_name = match entry.attributes.title.as_deref().map(str::trim) {
                Some(title) if !title.is_empty() => format!("Ch.{} - {}", raw, title),
                _ => format!("Ch.{}", raw),
            };

            Some(FetchedUpdate {
                source_id,
                origin_id: entry.id,
                chapter,
                chapter_name,
                observed_on: entry.attributes.publish_at,
                read_at: None,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl UpdateAdapter for MangadexAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Mangadex
    }

    async fn fetch(
        &self,
        source: &Source,
        options: FetchOptions,
    ) -> Result<Vec<FetchedUpdate>, AdapterError> {
        let manga_id = Uuid::parse_str(source.external_ref.trim())
            .map_err(|_| AdapterError::InvalidReference(source.external_ref.clone()))?;

        if options.only_latest {
            // A few entries rather than one: the newest may be a oneshot without a number
            let page = self.fetch_page(&manga_id, 5, 0).await?;
            return Ok(to_updates(source.id, page.data));
        }

        let mut updates = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.fetch_page(&manga_id, PAGE_SIZE, offset).await?;
            let received = page.data.len();
            let total = page.total;
            updates.extend(to_updates(source.id, page.data));

            offset += received;
            if received == 0 || offset >= total {
                break;
            }
        }

        tracing::info!(
            source = %source.name,
            chapters = updates.len(),
            "Retrieved chapter feed from MangaDex"
        );

        Ok(updates)
    }
}
