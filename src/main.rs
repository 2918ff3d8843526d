mod api;
mod cache;
mod config;
mod db;
mod error;
mod events;
mod feed;
mod leaderboard;
mod ledger;
mod settlement;
mod tracker;
mod trading;
mod types;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::cache::TtlCache;
use crate::config::{
    Config, CACHE_MAX_ENTRIES, CACHE_TTL_SECS, CHANNEL_CAPACITY, LEADERBOARD_INTERVAL_SECS,
};
use crate::error::Result;
use crate::events::Notifier;
use crate::feed::HttpMatchFeed;
use crate::leaderboard::builder::previous_week_bounds;
use crate::leaderboard::{build_week, BuildOutcome};
use crate::tracker::FixtureTracker;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    let health = Arc::new(HealthState::new());

    // --- Outbound event pipeline ---
    let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let notifier = Notifier::new(events_rx);
    tokio::spawn(async move { notifier.run().await });

    // --- Fixture tracker (background, every 30 min; also operator-triggered) ---
    let feed = HttpMatchFeed::new(cfg.feed_api_url.clone());
    let tracker = Arc::new(FixtureTracker::new(pool.clone(), feed, events_tx.clone()));
    {
        let tracker = Arc::clone(&tracker);
        let health = Arc::clone(&health);
        tokio::spawn(async move { tracker.run(health).await });
    }

    // --- Leaderboard scheduler (background; build is a no-op once frozen) ---
    {
        let pool = pool.clone();
        let health = Arc::clone(&health);
        tokio::spawn(async move { leaderboard_scheduler(pool, health).await });
    }

    // --- HTTP API server ---
    let api_state = ApiState {
        pool: pool.clone(),
        operator_token: cfg.operator_token.clone(),
        events_tx,
        tracker,
        health,
        leaderboard_cache: Arc::new(TtlCache::new(
            CACHE_MAX_ENTRIES,
            Duration::from_secs(CACHE_TTL_SECS),
        )),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the most recently completed week on a fixed cadence. Safe to fire
/// often: an already-built week is frozen and the call is a no-op.
async fn leaderboard_scheduler(pool: sqlx::SqlitePool, health: Arc<HealthState>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(LEADERBOARD_INTERVAL_SECS));

    loop {
        ticker.tick().await;
        let now = now_secs();
        let (week_start, week_end) = previous_week_bounds(now);
        match build_week(&pool, week_start, week_end).await {
            Ok(BuildOutcome::Built { accounts }) => {
                info!(week_start, week_end, accounts, "Scheduled leaderboard build complete");
            }
            Ok(BuildOutcome::AlreadyBuilt) => {}
            Err(e) => error!(week_start, week_end, "Scheduled leaderboard build failed: {e}"),
        }
        health.record_leaderboard_run(now);
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
