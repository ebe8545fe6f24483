//! Daily feed retrieval.
//!
//! Each trading day is published as one flat file at a deterministic URL:
//! `{prefix}{YYYYMMDD}{suffix}`. The `FeedSource` trait abstracts over the
//! transport so the range pipeline can be driven by fixtures in tests.
//!
//! There is no retry policy here. Callers own retry and backoff.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// 8-digit date token used in feed URLs and in the feed's `Date` column.
pub const URL_DATE_FORMAT: &str = "%Y%m%d";

/// Location and transport settings for the daily feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url_prefix: String,
    pub url_suffix: String,
    /// Per-request timeout. Covers connect and body read.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url_prefix: "https://cdn.finra.org/equity/regsho/daily/CNMSshvol".into(),
            url_suffix: ".txt".into(),
            timeout_secs: 30,
            user_agent: concat!("shortvol/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Build the feed URL for one calendar date.
pub fn feed_url(config: &FeedConfig, date: NaiveDate) -> String {
    format!(
        "{}{}{}",
        config.url_prefix,
        date.format(URL_DATE_FORMAT),
        config.url_suffix
    )
}

/// Failure to retrieve one day's payload.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The network call could not complete (connect, timeout, body read).
    #[error("transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },

    /// No file is published for this date (weekend, holiday, not yet posted).
    #[error("no data published for {date}")]
    NoDataForDate { date: NaiveDate },

    /// Any other non-success response.
    #[error("HTTP {status} fetching feed for {date}")]
    HttpStatus { date: NaiveDate, status: u16 },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    /// True when the date can be skipped without treating the range as failed.
    pub fn is_skippable(&self) -> bool {
        matches!(self, FetchError::NoDataForDate { .. })
    }
}

/// Source of raw daily payloads.
pub trait FeedSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the raw payload for one calendar date.
    fn fetch(&self, date: NaiveDate) -> Result<Vec<u8>, FetchError>;
}

/// HTTP feed backed by a blocking `reqwest` client.
pub struct HttpFeed {
    client: reqwest::blocking::Client,
    config: FeedConfig,
}

impl HttpFeed {
    pub fn new(config: FeedConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }
}

impl FeedSource for HttpFeed {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(&self, date: NaiveDate) -> Result<Vec<u8>, FetchError> {
        let url = feed_url(&self.config, date);
        tracing::debug!(%url, %date, "fetching daily feed");

        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.clone(),
            reason: e.to_string(),
        };

        let resp = self.client.get(&url).send().map_err(transport)?;
        let status = resp.status();

        // The CDN answers 403 rather than 404 for objects that do not exist.
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::NoDataForDate { date });
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                date,
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().map_err(transport)?;
        tracing::debug!(%date, bytes = body.len(), "feed payload received");
        Ok(body.to_vec())
    }
}
