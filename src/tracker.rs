//! Fixture lifecycle tracker. Periodic job that walks every unresolved
//! fixture kicking off within the look-ahead horizon, requests snapshots at
//! buy-window close, advances lifecycle states from the external feed, and
//! hands finished fixtures to settlement.
//!
//! Every per-fixture step is isolated: one failure increments the batch error
//! counter and never aborts the remaining items. The whole cycle is safe to
//! re-run from the start after a crash.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::config::{MATCH_DURATION_SECS, TRACKER_INTERVAL_SECS, TRACKER_LOOKAHEAD_SECS};
use crate::db::models::FixtureRow;
use crate::error::{AppError, Result};
use crate::feed::{FeedStatus, MatchFeed};
use crate::settlement::{capture_snapshot, settle, SettleOutcome, SnapshotOutcome};
use crate::types::{EngineEvent, FixtureStatus, MatchResult, TrackerSummary};

pub struct FixtureTracker<F: MatchFeed> {
    pool: SqlitePool,
    feed: F,
    events_tx: mpsc::Sender<EngineEvent>,
}

impl<F: MatchFeed> FixtureTracker<F> {
    pub fn new(pool: SqlitePool, feed: F, events_tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { pool, feed, events_tx }
    }

    pub async fn run(&self, health: Arc<HealthState>) {
        let mut ticker = interval(Duration::from_secs(TRACKER_INTERVAL_SECS));

        loop {
            ticker.tick().await;
            let now = now_secs();
            match self.run_cycle(now).await {
                Ok(summary) => {
                    health.record_tracker_cycle(now, summary.errors);
                    log_summary(&summary);
                }
                Err(e) => error!("Tracker cycle failed: {e}"),
            }
        }
    }

    /// One full pass over the work set. Public so the operator trigger can
    /// invoke it directly.
    ///
    /// A fixture only leaves the work set by resolving: `postponed`, or
    /// `applied` with its settlement recorded. Kickoff age never excludes an
    /// unresolved fixture, so a result arriving arbitrarily late still
    /// settles on the next cycle.
    pub async fn run_cycle(&self, now: i64) -> Result<TrackerSummary> {
        let fixtures: Vec<FixtureRow> = sqlx::query_as(
            "SELECT * FROM fixtures
             WHERE kickoff <= ?
               AND (status IN ('scheduled', 'closed')
                    OR (status = 'applied'
                        AND id NOT IN (SELECT fixture_id FROM settlements)))
             ORDER BY kickoff ASC",
        )
        .bind(now + TRACKER_LOOKAHEAD_SECS)
        .fetch_all(&self.pool)
        .await?;

        let mut summary = TrackerSummary::default();
        for fixture in fixtures {
            summary.processed += 1;
            if let Err(e) = self.process_fixture(&fixture, now, &mut summary).await {
                summary.errors += 1;
                match e {
                    AppError::TransientFeed(msg) => {
                        warn!(fixture_id = %fixture.id, "Feed fetch skipped: {msg}")
                    }
                    other => error!(fixture_id = %fixture.id, "Fixture processing failed: {other}"),
                }
            }
        }
        Ok(summary)
    }

    async fn process_fixture(
        &self,
        fixture: &FixtureRow,
        now: i64,
        summary: &mut TrackerSummary,
    ) -> Result<()> {
        let status = FixtureStatus::parse(&fixture.status)
            .ok_or_else(|| AppError::Validation(format!("unknown fixture status {}", fixture.status)))?;

        // Buy window closed while still scheduled: freeze the baseline before
        // anything else can advance the lifecycle.
        if status == FixtureStatus::Scheduled && now >= fixture.buy_close && !fixture.has_snapshot()
        {
            if capture_snapshot(&self.pool, &fixture.id).await? == SnapshotOutcome::Captured {
                summary.snapshots_taken += 1;
            }
        }

        // A fixture already `applied` only needs its settlement retried (the
        // engine itself makes retries no-ops).
        if status == FixtureStatus::Applied {
            self.try_settle(&fixture.id, summary).await?;
            return Ok(());
        }

        let state = self.feed.fixture_state(&fixture.external_ref).await?;

        match state.status {
            FeedStatus::Live => {
                if status == FixtureStatus::Scheduled
                    && now >= fixture.kickoff
                    && now < fixture.kickoff + MATCH_DURATION_SECS
                {
                    let updated = sqlx::query(
                        "UPDATE fixtures SET status = 'closed' WHERE id = ? AND status = 'scheduled'",
                    )
                    .bind(&fixture.id)
                    .execute(&self.pool)
                    .await?;
                    if updated.rows_affected() > 0 {
                        summary.closed += 1;
                        info!(fixture_id = %fixture.id, "Fixture closed (match live)");
                    }
                }
            }
            FeedStatus::Finished => {
                let result = match MatchResult::from_scores(state.home_score, state.away_score) {
                    Some(r) => r,
                    None => {
                        // Indeterminate: scores incomplete, stays pending.
                        summary.pending += 1;
                        warn!(fixture_id = %fixture.id, "Finished without full scores, pending");
                        return Ok(());
                    }
                };

                // Monotonic transition to `applied`; the predicate keeps a
                // concurrent or repeated cycle from rewriting the result.
                sqlx::query(
                    "UPDATE fixtures
                     SET status = 'applied', result = ?, home_score = ?, away_score = ?
                     WHERE id = ? AND status IN ('scheduled', 'closed')",
                )
                .bind(result.to_string())
                .bind(state.home_score)
                .bind(state.away_score)
                .bind(&fixture.id)
                .execute(&self.pool)
                .await?;

                self.try_settle(&fixture.id, summary).await?;
            }
            FeedStatus::Postponed => {
                let updated = sqlx::query(
                    "UPDATE fixtures SET status = 'postponed' WHERE id = ? AND status = 'scheduled'",
                )
                .bind(&fixture.id)
                .execute(&self.pool)
                .await?;
                if updated.rows_affected() > 0 {
                    summary.postponed += 1;
                    info!(fixture_id = %fixture.id, "Fixture postponed");
                }
            }
            FeedStatus::Scheduled | FeedStatus::Unknown => {}
        }

        Ok(())
    }

    async fn try_settle(&self, fixture_id: &str, summary: &mut TrackerSummary) -> Result<()> {
        match settle(&self.pool, fixture_id).await? {
            SettleOutcome::Applied { result, transfer_amount } => {
                summary.settled += 1;
                let event = EngineEvent::SettlementApplied {
                    fixture_id: fixture_id.to_string(),
                    result,
                    transfer_amount,
                };
                if let Err(e) = self.events_tx.try_send(event) {
                    warn!("Event channel full, dropping settlement event: {e}");
                }
            }
            SettleOutcome::AlreadySettled => {}
            SettleOutcome::SnapshotMissing => {
                // Reported each cycle until the snapshot is backfilled.
                summary.pending += 1;
            }
            SettleOutcome::NotEligible => {
                summary.pending += 1;
            }
        }
        Ok(())
    }
}

fn log_summary(s: &TrackerSummary) {
    info!(
        processed = s.processed,
        snapshots = s.snapshots_taken,
        closed = s.closed,
        settled = s.settled,
        postponed = s.postponed,
        pending = s.pending,
        errors = s.errors,
        "Tracker cycle complete: {} fixtures, {} settled, {} errors",
        s.processed,
        s.settled,
        s.errors,
    );
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::db::testutil;
    use crate::feed::FeedSnapshot;

    /// In-memory feed double keyed by external ref. Missing refs fail like a
    /// transient network error.
    struct MockFeed {
        states: HashMap<String, FeedSnapshot>,
    }

    impl MockFeed {
        fn new() -> Self {
            Self { states: HashMap::new() }
        }

        fn set(mut self, external_ref: &str, status: FeedStatus, home: Option<i64>, away: Option<i64>) -> Self {
            self.states.insert(
                external_ref.to_string(),
                FeedSnapshot { status, home_score: home, away_score: away },
            );
            self
        }
    }

    #[async_trait]
    impl MatchFeed for MockFeed {
        async fn fixture_state(&self, external_ref: &str) -> crate::error::Result<FeedSnapshot> {
            self.states
                .get(external_ref)
                .cloned()
                .ok_or_else(|| AppError::TransientFeed(format!("no data for {external_ref}")))
        }
    }

    fn tracker<F: MatchFeed>(pool: &SqlitePool, feed: F) -> FixtureTracker<F> {
        let (tx, _rx) = mpsc::channel(16);
        FixtureTracker::new(pool.clone(), feed, tx)
    }

    async fn seed_fixture(pool: &SqlitePool, id: &str, kickoff: i64, buy_close: i64) {
        testutil::insert_team(pool, &format!("{id}-home"), 100_000, 1000).await;
        testutil::insert_team(pool, &format!("{id}-away"), 100_000, 1000).await;
        testutil::insert_fixture(
            pool,
            id,
            &format!("{id}-home"),
            &format!("{id}-away"),
            kickoff,
            buy_close,
            "scheduled",
        )
        .await;
    }

    #[tokio::test]
    async fn finished_fixture_is_snapshotted_and_settled_in_one_cycle() {
        let pool = testutil::pool().await;
        let now = 1_000_000;
        seed_fixture(&pool, "f1", now - 3600, now - 5400).await;
        let feed = MockFeed::new().set("ext-f1", FeedStatus::Finished, Some(2), Some(0));

        let summary = tracker(&pool, feed).run_cycle(now).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.snapshots_taken, 1);
        assert_eq!(summary.settled, 1);
        assert_eq!(summary.errors, 0);

        assert_eq!(testutil::team_valuation(&pool, "f1-home").await, 110_000);
        assert_eq!(testutil::team_valuation(&pool, "f1-away").await, 90_000);
        let status: String = sqlx::query_scalar("SELECT status FROM fixtures WHERE id = 'f1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "applied");
    }

    #[tokio::test]
    async fn reprocessing_an_applied_fixture_never_resettles() {
        let pool = testutil::pool().await;
        let now = 1_000_000;
        seed_fixture(&pool, "f1", now - 3600, now - 5400).await;
        let feed = MockFeed::new().set("ext-f1", FeedStatus::Finished, Some(2), Some(0));
        let t = tracker(&pool, feed);

        t.run_cycle(now).await.unwrap();
        // Settled and applied: the fixture has resolved out of the work set.
        let second = t.run_cycle(now + 60).await.unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.settled, 0);
        assert_eq!(second.errors, 0);

        // Valuations identical to a single settlement.
        assert_eq!(testutil::team_valuation(&pool, "f1-home").await, 110_000);
        assert_eq!(testutil::team_valuation(&pool, "f1-away").await, 90_000);
    }

    #[tokio::test]
    async fn result_arriving_long_after_kickoff_still_settles() {
        let pool = testutil::pool().await;
        let now = 1_000_000;
        // Kickoff more than a full match duration ago; the feed only now
        // reports the final score.
        seed_fixture(&pool, "f1", now - MATCH_DURATION_SECS - 60, now - MATCH_DURATION_SECS - 1800)
            .await;
        let feed = MockFeed::new().set("ext-f1", FeedStatus::Finished, Some(2), Some(0));

        let summary = tracker(&pool, feed).run_cycle(now).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.settled, 1);

        assert_eq!(testutil::team_valuation(&pool, "f1-home").await, 110_000);
        assert_eq!(testutil::team_valuation(&pool, "f1-away").await, 90_000);
        let status: String = sqlx::query_scalar("SELECT status FROM fixtures WHERE id = 'f1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "applied");
    }

    #[tokio::test]
    async fn live_fixture_transitions_to_closed() {
        let pool = testutil::pool().await;
        let now = 1_000_000;
        seed_fixture(&pool, "f1", now - 600, now - 2400).await;
        let feed = MockFeed::new().set("ext-f1", FeedStatus::Live, None, None);

        let summary = tracker(&pool, feed).run_cycle(now).await.unwrap();
        assert_eq!(summary.closed, 1);
        assert_eq!(summary.snapshots_taken, 1);

        let status: String = sqlx::query_scalar("SELECT status FROM fixtures WHERE id = 'f1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "closed");
    }

    #[tokio::test]
    async fn postponed_fixture_leaves_the_lifecycle() {
        let pool = testutil::pool().await;
        let now = 1_000_000;
        seed_fixture(&pool, "f1", now + 3600, now + 1800).await;
        let feed = MockFeed::new().set("ext-f1", FeedStatus::Postponed, None, None);

        let summary = tracker(&pool, feed).run_cycle(now).await.unwrap();
        assert_eq!(summary.postponed, 1);

        let status: String = sqlx::query_scalar("SELECT status FROM fixtures WHERE id = 'f1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "postponed");
    }

    #[tokio::test]
    async fn missing_scores_keep_the_fixture_pending() {
        let pool = testutil::pool().await;
        let now = 1_000_000;
        seed_fixture(&pool, "f1", now - 3600, now - 5400).await;
        let feed = MockFeed::new().set("ext-f1", FeedStatus::Finished, Some(2), None);

        let summary = tracker(&pool, feed).run_cycle(now).await.unwrap();
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.settled, 0);

        let status: String = sqlx::query_scalar("SELECT status FROM fixtures WHERE id = 'f1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "scheduled");
    }

    #[tokio::test]
    async fn one_feed_failure_does_not_abort_the_batch() {
        let pool = testutil::pool().await;
        let now = 1_000_000;
        seed_fixture(&pool, "f1", now - 3600, now - 5400).await;
        seed_fixture(&pool, "f2", now - 3600, now - 5400).await;
        // Only f2 has feed data; f1's fetch fails.
        let feed = MockFeed::new().set("ext-f2", FeedStatus::Finished, Some(0), Some(3));

        let summary = tracker(&pool, feed).run_cycle(now).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.settled, 1);

        assert_eq!(testutil::team_valuation(&pool, "f2-away").await, 110_000);
        assert_eq!(testutil::team_valuation(&pool, "f1-home").await, 100_000);
    }
}
