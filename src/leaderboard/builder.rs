//! Leaderboard builder: aggregates one week's balances per account, computes
//! deposit-adjusted returns, ranks, and freezes the rows. Building the same
//! (week_start, week_end) pair twice is a no-op by construction.

use std::cmp::Ordering;

use chrono::{Datelike, Duration, NaiveTime, TimeZone, Utc};
use sqlx::{SqlitePool, Transaction};
use tracing::info;

use crate::error::Result;
use crate::leaderboard::returns::{account_value, weekly_return};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built { accounts: usize },
    /// Rows for this exact week already exist; published returns are frozen.
    AlreadyBuilt,
}

/// Boundaries of the most recent fully completed week, Monday 00:00 UTC to
/// Monday 00:00 UTC, as unix seconds.
pub fn previous_week_bounds(now_secs: i64) -> (i64, i64) {
    let now = Utc.timestamp_opt(now_secs, 0).single().unwrap_or_else(Utc::now);
    let days_into_week = now.weekday().num_days_from_monday() as i64;
    let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let this_week_start = midnight - Duration::days(days_into_week);
    let prev_week_start = this_week_start - Duration::days(7);
    (prev_week_start.timestamp(), this_week_start.timestamp())
}

struct WeekAggregate {
    account_id: String,
    start_wallet: i64,
    start_portfolio: i64,
    end_wallet: i64,
    end_portfolio: i64,
    deposits: i64,
    weekly_return: f64,
}

/// Build the leaderboard for [week_start, week_end) (unix seconds).
///
/// End values are read from the running balances at build time; start values
/// come from the previous week's frozen snapshot, so week N's end equals
/// week N+1's start by construction, never by re-derivation.
pub async fn build_week(pool: &SqlitePool, week_start: i64, week_end: i64) -> Result<BuildOutcome> {
    let mut tx = pool.begin().await?;

    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM leaderboard_entries WHERE week_start = ? AND week_end = ?",
    )
    .bind(week_start)
    .bind(week_end)
    .fetch_one(&mut *tx)
    .await?;
    if existing > 0 {
        return Ok(BuildOutcome::AlreadyBuilt);
    }

    sqlx::query("UPDATE leaderboard_entries SET is_latest = 0 WHERE is_latest = 1")
        .execute(&mut *tx)
        .await?;

    let account_ids: Vec<String> =
        sqlx::query_scalar("SELECT id FROM accounts WHERE created_at < ? ORDER BY id")
            .bind(week_end)
            .fetch_all(&mut *tx)
            .await?;

    let mut aggregates = Vec::with_capacity(account_ids.len());
    for account_id in account_ids {
        aggregates.push(aggregate_account(&mut tx, &account_id, week_start, week_end).await?);
    }

    // Total order: descending return, ascending account id as the
    // deterministic tie-break.
    aggregates.sort_by(|a, b| {
        b.weekly_return
            .partial_cmp(&a.weekly_return)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.account_id.cmp(&b.account_id))
    });

    let count = aggregates.len();
    for (i, agg) in aggregates.iter().enumerate() {
        sqlx::query(
            "INSERT INTO account_week_snapshots
                 (account_id, week_start, week_end, start_wallet, end_wallet,
                  start_portfolio, end_portfolio, deposits)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&agg.account_id)
        .bind(week_start)
        .bind(week_end)
        .bind(agg.start_wallet)
        .bind(agg.end_wallet)
        .bind(agg.start_portfolio)
        .bind(agg.end_portfolio)
        .bind(agg.deposits)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO leaderboard_entries
                 (week_start, week_end, account_id, rank, weekly_return, is_latest)
             VALUES (?, ?, ?, ?, ?, 1)",
        )
        .bind(week_start)
        .bind(week_end)
        .bind(&agg.account_id)
        .bind((i + 1) as i64)
        .bind(agg.weekly_return)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(week_start, week_end, accounts = count, "Leaderboard built");
    Ok(BuildOutcome::Built { accounts: count })
}

async fn aggregate_account(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    account_id: &str,
    week_start: i64,
    week_end: i64,
) -> Result<WeekAggregate> {
    let end_wallet: i64 = sqlx::query_scalar("SELECT wallet FROM accounts WHERE id = ?")
        .bind(account_id)
        .fetch_one(&mut **tx)
        .await?;

    // Portfolio at the crossing instant: quantity times the live per-share
    // price derived from valuation.
    let end_portfolio: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(p.quantity * (t.valuation / t.total_shares)), 0)
         FROM positions p JOIN teams t ON t.id = p.team_id
         WHERE p.account_id = ?",
    )
    .bind(account_id)
    .fetch_one(&mut **tx)
    .await?;

    let deposits: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM wallet_credits
         WHERE account_id = ? AND credited_at >= ? AND credited_at < ?",
    )
    .bind(account_id)
    .bind(week_start)
    .bind(week_end)
    .fetch_one(&mut **tx)
    .await?;

    // Chaining: this week's start is the previous week's frozen end.
    let prev: Option<(i64, i64)> = sqlx::query_as(
        "SELECT end_wallet, end_portfolio FROM account_week_snapshots
         WHERE account_id = ? AND week_end = ?",
    )
    .bind(account_id)
    .bind(week_start)
    .fetch_optional(&mut **tx)
    .await?;
    let (start_wallet, start_portfolio) = prev.unwrap_or((0, 0));

    let ret = weekly_return(
        account_value(start_wallet, start_portfolio),
        account_value(end_wallet, end_portfolio),
        deposits,
    );

    Ok(WeekAggregate {
        account_id: account_id.to_string(),
        start_wallet,
        start_portfolio,
        end_wallet,
        end_portfolio,
        deposits,
        weekly_return: ret,
    })
}
