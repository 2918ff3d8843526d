//! External match data source. Polled by the tracker on a fixed cadence;
//! transient failures are logged and skipped, never fatal to the batch.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};

/// Upstream status of a single fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    /// Status string we don't recognize — treated as no signal.
    Unknown,
}

/// One fixture's state as reported by the feed.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub status: FeedStatus,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

#[async_trait]
pub trait MatchFeed: Send + Sync {
    /// Fetch the current state of a fixture by its external reference.
    async fn fixture_state(&self, external_ref: &str) -> Result<FeedSnapshot>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FeedFixtureBody {
    status: String,
    #[serde(default)]
    home_score: Option<i64>,
    #[serde(default)]
    away_score: Option<i64>,
}

pub struct HttpMatchFeed {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMatchFeed {
    pub fn new(base_url: String) -> Self {
        Self { client: reqwest::Client::new(), base_url }
    }
}

#[async_trait]
impl MatchFeed for HttpMatchFeed {
    async fn fixture_state(&self, external_ref: &str) -> Result<FeedSnapshot> {
        let url = format!("{}/fixtures/{external_ref}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::TransientFeed(format!("GET {url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::TransientFeed(format!(
                "GET {url}: status {}",
                resp.status()
            )));
        }

        let body: FeedFixtureBody = resp
            .json()
            .await
            .map_err(|e| AppError::TransientFeed(format!("GET {url}: bad body: {e}")))?;

        Ok(FeedSnapshot {
            status: parse_feed_status(&body.status),
            home_score: body.home_score,
            away_score: body.away_score,
        })
    }
}

fn parse_feed_status(s: &str) -> FeedStatus {
    match s.to_ascii_lowercase().as_str() {
        "scheduled" | "timed" | "ns" => FeedStatus::Scheduled,
        "live" | "in_play" | "1h" | "2h" | "ht" | "et" => FeedStatus::Live,
        "finished" | "ft" | "full_time" | "aet" | "pen" => FeedStatus::Finished,
        "postponed" | "cancelled" | "abandoned" => FeedStatus::Postponed,
        _ => FeedStatus::Unknown,
    }
}
