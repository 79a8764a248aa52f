//! Webtoon episode list adapter
//!
//! Uses the mobile site's episode list endpoint. A source's `external_ref`
//! is the series `title_no`, optionally prefixed with `canvas:` for
//! Canvas (self-published) series.

use super::{check_status, request_pacer, AdapterError, FetchOptions, Pacer, UpdateAdapter};
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use smithers_common::db::{AdapterKind, FetchedUpdate, Source};
use std::time::Duration;
use uuid::Uuid;

const WEBTOON_BASE_URL: &str = "https://m.webtoons.com";
const REFERER: &str = "https://m.webtoons.com/";
const MIN_REQUEST_INTERVAL_MS: u64 = 500;

#[derive(Debug, Deserialize)]
struct EpisodeListResponse {
    result: EpisodeListResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpisodeListResult {
    #[serde(default)]
    episode_list: Vec<Episode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Episode {
    episode_no: u32,
    episode_title: String,
    exposure_date_millis: i64,
}

/// Series reference parsed from `external_ref`
#[derive(Debug, PartialEq, Eq)]
struct SeriesRef {
    canvas: bool,
    title_no: u64,
}

impl SeriesRef {
    fn parse(raw: &str) -> Result<Self, AdapterError> {
        let raw = raw.trim();
        let (canvas, number) = match raw.strip_prefix("canvas:") {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let title_no = number
            .trim()
            .parse::<u64>()
            .map_err(|_| AdapterError::InvalidReference(raw.to_string()))?;
        Ok(Self { canvas, title_no })
    }

    fn path(&self) -> String {
        let kind = if self.canvas { "canvas" } else { "webtoon" };
        format!("/api/v1/{}/{}/episodes", kind, self.title_no)
    }
}

/// Webtoon mobile API adapter
pub struct WebtoonAdapter {
    http_client: reqwest::Client,
    base_url: String,
    pacer: Pacer,
}

impl WebtoonAdapter {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self::with_base_url(http_client, WEBTOON_BASE_URL)
    }

    /// Point the adapter at another host
    pub fn with_base_url(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pacer: request_pacer(Duration::from_millis(MIN_REQUEST_INTERVAL_MS)),
        }
    }
}

fn parse_episode_list(body: &str) -> Result<Vec<Episode>, AdapterError> {
    let response: EpisodeListResponse =
        serde_json::from_str(body).map_err(|e| AdapterError::Parse(e.to_string()))?;
    Ok(response.result.episode_list)
}

fn to_updates(source_id: Uuid, episodes: Vec<Episode>) -> Result<Vec<FetchedUpdate>, AdapterError> {
    episodes
        .into_iter()
        .map(|episode| {
            let observed_on = Utc
                .timestamp_millis_opt(episode.exposure_date_millis)
                .single()
                .ok_or_else(|| {
                    AdapterError::Parse(format!(
                        "episode {} has invalid exposure date {}",
                        episode.episode_no, episode.exposure_date_millis
                    ))
                })?;

            Ok(FetchedUpdate {
                source_id,
                origin_id: episode.episode_no.to_string(),
                chapter: f64::from(episode.episode_no),
                chapter_name: episode.episode_title.trim().to_string(),
                observed_on,
                read_at: None,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl UpdateAdapter for WebtoonAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Webtoon
    }

    async fn fetch(
        &self,
        source: &Source,
        options: FetchOptions,
    ) -> Result<Vec<FetchedUpdate>, AdapterError> {
        let series = SeriesRef::parse(&source.external_ref)?;
        let page_size = if options.only_latest { 1 } else { 9999 };

        self.pacer.until_ready().await;

        let url = format!("{}{}", self.base_url, series.path());
        tracing::debug!(source = %source.name, url = %url, "Querying Webtoon episode list");

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::REFERER, REFERER)
            .query(&[("pageSize", page_size.to_string())])
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        let response = check_status(response, &source.external_ref).await?;
        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        let updates = to_updates(source.id, parse_episode_list(&body)?)?;

        tracing::info!(
            source = %source.name,
            episodes = updates.len(),
            "Retrieved episode list from Webtoon"
        );

        Ok(updates)
    }
}
