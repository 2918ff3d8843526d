//! Valuation snapshot store: freezes both teams' pre-match valuations on the
//! fixture at buy-window close. No value transfer happens here — this only
//! fixes the baseline settlement will use.

use sqlx::SqlitePool;
use tracing::info;

use crate::db::models::FixtureRow;
use crate::error::{AppError, Result};
use crate::types::FixtureStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Captured,
    /// Snapshot fields already set — a repeat call is a no-op, not an error.
    AlreadySnapshotted,
    /// Fixture is past `scheduled`; the baseline can no longer be taken here.
    NotEligible,
}

pub async fn capture_snapshot(pool: &SqlitePool, fixture_id: &str) -> Result<SnapshotOutcome> {
    let mut tx = pool.begin().await?;

    let fixture: FixtureRow = sqlx::query_as("SELECT * FROM fixtures WHERE id = ?")
        .bind(fixture_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("fixture", fixture_id.to_string()))?;

    if fixture.has_snapshot() {
        return Ok(SnapshotOutcome::AlreadySnapshotted);
    }
    if FixtureStatus::parse(&fixture.status) != Some(FixtureStatus::Scheduled) {
        return Ok(SnapshotOutcome::NotEligible);
    }

    let home_cap: i64 = sqlx::query_scalar("SELECT valuation FROM teams WHERE id = ?")
        .bind(&fixture.home_team_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("team", fixture.home_team_id.clone()))?;
    let away_cap: i64 = sqlx::query_scalar("SELECT valuation FROM teams WHERE id = ?")
        .bind(&fixture.away_team_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("team", fixture.away_team_id.clone()))?;

    // Guarded write: the status/NULL predicates make a concurrent second
    // capture insert nothing rather than overwrite the baseline.
    let updated = sqlx::query(
        "UPDATE fixtures SET home_snapshot_cap = ?, away_snapshot_cap = ?
         WHERE id = ? AND status = 'scheduled' AND home_snapshot_cap IS NULL",
    )
    .bind(home_cap)
    .bind(away_cap)
    .bind(fixture_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Ok(SnapshotOutcome::AlreadySnapshotted);
    }

    tx.commit().await?;
    info!(
        fixture_id = %fixture_id,
        home_cap,
        away_cap,
        "Snapshot captured"
    );
    Ok(SnapshotOutcome::Captured)
}
