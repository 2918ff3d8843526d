//! Trading gate: decides at order time whether a team is currently tradeable.
//! Always computed fresh from the store — never cached.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::warn;

use crate::config::MATCH_DURATION_SECS;
use crate::types::{GateDecision, GateReason};

/// Evaluate the gate for `team_id` at instant `now` (unix seconds).
///
/// Closed when a match involving the team is in progress, or when the
/// earliest upcoming fixture's buy window has closed pending kickoff. A team
/// with no upcoming fixture is open by default. Any lookup failure closes
/// trading with a diagnostic reason — fail-safe, never fail-open.
pub async fn evaluate_gate(pool: &SqlitePool, team_id: &str, now: i64) -> GateDecision {
    let looked_up = async {
        let mut conn = pool.acquire().await?;
        evaluate_gate_on(&mut conn, team_id, now).await
    }
    .await;
    match looked_up {
        Ok(decision) => decision,
        Err(e) => {
            warn!(team_id = %team_id, "Gate lookup failed, closing trading: {e}");
            GateDecision::closed(GateReason::LookupFailed)
        }
    }
}

/// Gate evaluation on an explicit connection, so a caller holding a
/// transaction sees the gate through that transaction's view.
pub async fn evaluate_gate_on(
    conn: &mut SqliteConnection,
    team_id: &str,
    now: i64,
) -> sqlx::Result<GateDecision> {
    // 1. Match in progress: a closed fixture within the fixed match duration.
    let in_progress: Option<i64> = sqlx::query_scalar(
        "SELECT kickoff FROM fixtures
         WHERE (home_team_id = ? OR away_team_id = ?)
           AND status = 'closed'
           AND kickoff <= ? AND ? < kickoff + ?
         LIMIT 1",
    )
    .bind(team_id)
    .bind(team_id)
    .bind(now)
    .bind(now)
    .bind(MATCH_DURATION_SECS)
    .fetch_optional(&mut *conn)
    .await?;

    if in_progress.is_some() {
        return Ok(GateDecision::closed(GateReason::MatchInProgress));
    }

    // 2. Earliest still-scheduled fixture: window closed once buy_close passes.
    let next_buy_close: Option<i64> = sqlx::query_scalar(
        "SELECT buy_close FROM fixtures
         WHERE (home_team_id = ? OR away_team_id = ?)
           AND status = 'scheduled'
         ORDER BY kickoff ASC
         LIMIT 1",
    )
    .bind(team_id)
    .bind(team_id)
    .fetch_optional(&mut *conn)
    .await?;

    match next_buy_close {
        Some(buy_close) if now >= buy_close => {
            Ok(GateDecision::closed(GateReason::WindowClosedPendingKickoff))
        }
        // 3 & 4: window still open, or no upcoming fixture at all.
        _ => Ok(GateDecision::open()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;

    const MIN: i64 = 60;

    #[tokio::test]
    async fn open_before_buy_close_closed_after() {
        let pool = testutil::pool().await;
        testutil::insert_team(&pool, "t1", 100_000, 1000).await;
        testutil::insert_team(&pool, "t2", 100_000, 1000).await;

        // Kickoff at T, buy close at T - 30min.
        let kickoff = 100_000;
        let buy_close = kickoff - 30 * MIN;
        testutil::insert_fixture(&pool, "f1", "t1", "t2", kickoff, buy_close, "scheduled").await;

        let at_t_minus_40 = evaluate_gate(&pool, "t1", kickoff - 40 * MIN).await;
        assert!(at_t_minus_40.open);

        let at_t_minus_20 = evaluate_gate(&pool, "t1", kickoff - 20 * MIN).await;
        assert!(!at_t_minus_20.open);
        assert_eq!(at_t_minus_20.reason, GateReason::WindowClosedPendingKickoff);
    }

    #[tokio::test]
    async fn closed_while_match_in_progress() {
        let pool = testutil::pool().await;
        testutil::insert_team(&pool, "t1", 100_000, 1000).await;
        testutil::insert_team(&pool, "t2", 100_000, 1000).await;

        let kickoff = 100_000;
        testutil::insert_fixture(&pool, "f1", "t1", "t2", kickoff, kickoff - 30 * MIN, "closed")
            .await;

        let mid_match = evaluate_gate(&pool, "t2", kickoff + 45 * MIN).await;
        assert_eq!(mid_match.reason, GateReason::MatchInProgress);

        // Past the fixed duration the in-progress rule no longer applies.
        let after = evaluate_gate(&pool, "t2", kickoff + MATCH_DURATION_SECS + MIN).await;
        assert!(after.open);
    }

    #[tokio::test]
    async fn no_upcoming_fixture_is_open_by_default() {
        let pool = testutil::pool().await;
        testutil::insert_team(&pool, "t1", 100_000, 1000).await;

        let decision = evaluate_gate(&pool, "t1", 100_000).await;
        assert!(decision.open);
        assert_eq!(decision.reason, GateReason::Open);
    }

    #[tokio::test]
    async fn earliest_scheduled_fixture_decides_the_window() {
        let pool = testutil::pool().await;
        testutil::insert_team(&pool, "t1", 100_000, 1000).await;
        testutil::insert_team(&pool, "t2", 100_000, 1000).await;
        testutil::insert_team(&pool, "t3", 100_000, 1000).await;

        let now = 100_000;
        // Later fixture's window is still open, but the earliest one has
        // closed — the earliest wins.
        testutil::insert_fixture(&pool, "f1", "t1", "t2", now + 10 * MIN, now - MIN, "scheduled")
            .await;
        testutil::insert_fixture(
            &pool,
            "f2",
            "t1",
            "t3",
            now + 7 * 24 * 3600,
            now + 6 * 24 * 3600,
            "scheduled",
        )
        .await;

        let decision = evaluate_gate(&pool, "t1", now).await;
        assert_eq!(decision.reason, GateReason::WindowClosedPendingKickoff);
    }
}
