use crate::error::{AppError, Result};

pub const FEED_API_URL: &str = "https://api.matchfeed.example.com/v1";

/// Settlement transfer rate: winner gains this percentage of the loser's
/// pre-match valuation; the loser pays the identical absolute amount.
pub const SETTLEMENT_RATE_PCT: i64 = 10;

/// Fixed match duration assumed by the trading gate (seconds). The feed gives
/// no authoritative end-of-match signal, so "match in progress" means
/// now ∈ [kickoff, kickoff + MATCH_DURATION_SECS].
pub const MATCH_DURATION_SECS: i64 = 2 * 3600;

/// Fixture tracker cadence (seconds).
pub const TRACKER_INTERVAL_SECS: u64 = 1800;

/// Leaderboard scheduler cadence (seconds). Building an already-built week is
/// a no-op, so a cadence much tighter than weekly is safe.
pub const LEADERBOARD_INTERVAL_SECS: u64 = 3600;

/// Tracker look-ahead: fixtures kicking off more than this far in the future
/// are left alone. Past fixtures stay in the work set until resolved, however
/// old — a late feed result must still settle.
pub const TRACKER_LOOKAHEAD_SECS: i64 = 48 * 3600;

/// Channel capacity for outbound engine events.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Response cache bounds (presentation reads only).
pub const CACHE_MAX_ENTRIES: usize = 256;
pub const CACHE_TTL_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub feed_api_url: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Shared secret for the /admin trigger endpoints (OPERATOR_TOKEN).
    pub operator_token: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let operator_token = std::env::var("OPERATOR_TOKEN")
            .map_err(|_| AppError::Config("OPERATOR_TOKEN must be set".to_string()))?;
        if operator_token.is_empty() {
            return Err(AppError::Config("OPERATOR_TOKEN must not be empty".to_string()));
        }

        Ok(Self {
            feed_api_url: std::env::var("FEED_API_URL")
                .unwrap_or_else(|_| FEED_API_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "engine.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            operator_token,
        })
    }
}
