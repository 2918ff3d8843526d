//! Settlement engine: the one-time application of a match result to team
//! valuations. The valuation updates and a uniquely-keyed ledger insert form
//! one transaction; the ledger's primary key on fixture_id is the
//! exactly-once guard.

use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::SETTLEMENT_RATE_PCT;
use crate::db::models::FixtureRow;
use crate::error::{AppError, Result};
use crate::types::{FixtureStatus, MatchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Applied { result: MatchResult, transfer_amount: i64 },
    /// A prior attempt already settled this fixture; nothing was reapplied.
    AlreadySettled,
    /// Pre-match baseline missing. Refused, resolvable by backfilling the
    /// snapshot and retrying on a later cycle.
    SnapshotMissing,
    /// Fixture not yet `applied` or result still indeterminate.
    NotEligible,
}

pub async fn settle(pool: &SqlitePool, fixture_id: &str) -> Result<SettleOutcome> {
    let mut tx = pool.begin().await?;

    let fixture: FixtureRow = sqlx::query_as("SELECT * FROM fixtures WHERE id = ?")
        .bind(fixture_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("fixture", fixture_id.to_string()))?;

    if FixtureStatus::parse(&fixture.status) != Some(FixtureStatus::Applied) {
        return Ok(SettleOutcome::NotEligible);
    }
    let result = match fixture.result.as_deref().and_then(MatchResult::parse) {
        Some(r) => r,
        None => return Ok(SettleOutcome::NotEligible),
    };
    let (home_cap, away_cap) = match (fixture.home_snapshot_cap, fixture.away_snapshot_cap) {
        (Some(h), Some(a)) => (h, a),
        _ => {
            warn!(fixture_id = %fixture_id, "Settlement refused: snapshot missing");
            return Ok(SettleOutcome::SnapshotMissing);
        }
    };

    // Transfer is a fixed share of the loser's *pre-match* valuation, so the
    // amount gained and the amount lost are identical: value is conserved.
    let (winner_id, loser_id, transfer_amount) = match result {
        MatchResult::HomeWin => (
            Some(&fixture.home_team_id),
            Some(&fixture.away_team_id),
            away_cap * SETTLEMENT_RATE_PCT / 100,
        ),
        MatchResult::AwayWin => (
            Some(&fixture.away_team_id),
            Some(&fixture.home_team_id),
            home_cap * SETTLEMENT_RATE_PCT / 100,
        ),
        MatchResult::Draw => (None, None, 0),
    };

    // Exactly-once guard: zero rows affected means a prior attempt won.
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO settlements (fixture_id, result, transfer_amount, settled_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(fixture_id)
    .bind(result.to_string())
    .bind(transfer_amount)
    .bind(now_secs())
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        return Ok(SettleOutcome::AlreadySettled);
    }

    if let (Some(winner), Some(loser)) = (winner_id, loser_id) {
        sqlx::query("UPDATE teams SET valuation = valuation + ? WHERE id = ?")
            .bind(transfer_amount)
            .bind(winner)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE teams SET valuation = valuation - ? WHERE id = ?")
            .bind(transfer_amount)
            .bind(loser)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    info!(
        fixture_id = %fixture_id,
        result = %result,
        transfer_amount,
        "Settlement applied"
    );
    Ok(SettleOutcome::Applied { result, transfer_amount })
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
