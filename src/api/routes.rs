use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::api::health::HealthState;
use crate::cache::TtlCache;
use crate::error::{AppError, Result};
use crate::feed::HttpMatchFeed;
use crate::leaderboard::builder::previous_week_bounds;
use crate::leaderboard::{build_week, BuildOutcome};
use crate::ledger::{credit_wallet, CreditOutcome};
use crate::tracker::FixtureTracker;
use crate::trading::{evaluate_gate, purchase, PurchaseRequest};
use crate::types::{EngineEvent, GateDecision, TrackerSummary};

const OPERATOR_TOKEN_HEADER: &str = "x-operator-token";
const LEADERBOARD_CACHE_KEY: &str = "leaderboard:latest";

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub operator_token: String,
    pub events_tx: mpsc::Sender<EngineEvent>,
    pub tracker: Arc<FixtureTracker<HttpMatchFeed>>,
    pub health: Arc<HealthState>,
    pub leaderboard_cache: Arc<TtlCache<Vec<LeaderboardEntryResponse>>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/teams/:id/gate", get(get_gate))
        .route("/leaderboard/latest", get(get_leaderboard_latest))
        .route("/purchase", post(post_purchase))
        .route("/wallet/credit", post(post_wallet_credit))
        .route("/admin/tracker/run", post(post_tracker_run))
        .route("/admin/leaderboard/build", post(post_leaderboard_build))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct PurchaseBody {
    pub account_id: String,
    pub team_id: String,
    pub quantity: i64,
    pub quoted_price_per_share: i64,
}

#[derive(Serialize)]
pub struct PurchaseResponse {
    pub order_id: i64,
    pub price_per_share: i64,
    pub amount: i64,
}

#[derive(Deserialize)]
pub struct CreditBody {
    pub account_id: String,
    pub amount_minor_units: i64,
    pub idempotency_ref: String,
}

#[derive(Serialize)]
pub struct CreditResponse {
    pub credited: bool,
    /// Present only when this call performed the credit.
    pub wallet: Option<i64>,
}

#[derive(Deserialize)]
pub struct BuildWeekBody {
    pub week_start: i64,
    pub week_end: i64,
}

#[derive(Serialize)]
pub struct BuildWeekResponse {
    pub week_start: i64,
    pub week_end: i64,
    pub built: bool,
    pub accounts: usize,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LeaderboardEntryResponse {
    pub rank: i64,
    pub account_id: String,
    pub weekly_return: f64,
    pub week_start: i64,
    pub week_end: i64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub last_tracker_cycle_at: i64,
    pub tracker_cycles_total: u64,
    pub tracker_errors_total: u64,
    pub last_leaderboard_run_at: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        last_tracker_cycle_at: state.health.last_tracker_cycle_at(),
        tracker_cycles_total: state.health.tracker_cycles_total(),
        tracker_errors_total: state.health.tracker_errors_total(),
        last_leaderboard_run_at: state.health.last_leaderboard_run_at(),
    })
}

/// Always evaluated fresh — gate decisions are never cached.
async fn get_gate(
    State(state): State<ApiState>,
    Path(team_id): Path<String>,
) -> Json<GateDecision> {
    Json(evaluate_gate(&state.pool, &team_id, now_secs()).await)
}

async fn get_leaderboard_latest(
    State(state): State<ApiState>,
) -> Result<Json<Vec<LeaderboardEntryResponse>>> {
    if let Some(cached) = state.leaderboard_cache.get(LEADERBOARD_CACHE_KEY) {
        return Ok(Json(cached));
    }

    let rows: Vec<LeaderboardEntryResponse> = sqlx::query_as(
        "SELECT rank, account_id, weekly_return, week_start, week_end
         FROM leaderboard_entries
         WHERE is_latest = 1
         ORDER BY rank ASC",
    )
    .fetch_all(&state.pool)
    .await?;

    state.leaderboard_cache.put(LEADERBOARD_CACHE_KEY.to_string(), rows.clone());
    Ok(Json(rows))
}

async fn post_purchase(
    State(state): State<ApiState>,
    Json(body): Json<PurchaseBody>,
) -> Result<Json<PurchaseResponse>> {
    let receipt = purchase(
        &state.pool,
        &state.events_tx,
        PurchaseRequest {
            account_id: body.account_id,
            team_id: body.team_id,
            quantity: body.quantity,
            quoted_price_per_share: body.quoted_price_per_share,
        },
    )
    .await?;

    Ok(Json(PurchaseResponse {
        order_id: receipt.order_id,
        price_per_share: receipt.price_per_share,
        amount: receipt.amount,
    }))
}

async fn post_wallet_credit(
    State(state): State<ApiState>,
    Json(body): Json<CreditBody>,
) -> Result<Json<CreditResponse>> {
    let outcome = credit_wallet(
        &state.pool,
        &body.account_id,
        body.amount_minor_units,
        &body.idempotency_ref,
    )
    .await?;

    Ok(Json(match outcome {
        CreditOutcome::Credited { new_wallet } => {
            CreditResponse { credited: true, wallet: Some(new_wallet) }
        }
        CreditOutcome::Duplicate => CreditResponse { credited: false, wallet: None },
    }))
}

async fn post_tracker_run(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<TrackerSummary>> {
    authorize(&state.operator_token, &headers)?;

    let now = now_secs();
    let summary = state.tracker.run_cycle(now).await?;
    state.health.record_tracker_cycle(now, summary.errors);
    Ok(Json(summary))
}

async fn post_leaderboard_build(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Option<Json<BuildWeekBody>>,
) -> Result<Json<BuildWeekResponse>> {
    authorize(&state.operator_token, &headers)?;

    let now = now_secs();
    let (week_start, week_end) = match body {
        Some(Json(b)) => {
            if b.week_end <= b.week_start {
                return Err(AppError::Validation(
                    "week_end must be after week_start".to_string(),
                ));
            }
            (b.week_start, b.week_end)
        }
        None => previous_week_bounds(now),
    };

    let outcome = build_week(&state.pool, week_start, week_end).await?;
    state.health.record_leaderboard_run(now);
    state.leaderboard_cache.invalidate(LEADERBOARD_CACHE_KEY);

    Ok(Json(match outcome {
        BuildOutcome::Built { accounts } => {
            BuildWeekResponse { week_start, week_end, built: true, accounts }
        }
        // Already frozen for this week — an expected no-op, not a failure.
        BuildOutcome::AlreadyBuilt => {
            BuildWeekResponse { week_start, week_end, built: false, accounts: 0 }
        }
    }))
}

/// Unauthorized callers are rejected before any side effect.
fn authorize(operator_token: &str, headers: &HeaderMap) -> Result<()> {
    let presented = headers
        .get(OPERATOR_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented.is_empty() || presented != operator_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
