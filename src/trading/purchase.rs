//! Purchase transaction: converts cash into a position at the current
//! valuation. Debit, position increment, and order record form one
//! transaction — all five steps succeed or none do.

use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::db::models::TeamRow;
use crate::error::{AppError, BusinessRuleError, Result};
use crate::trading::gate::evaluate_gate_on;
use crate::types::EngineEvent;

#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub account_id: String,
    pub team_id: String,
    pub quantity: i64,
    /// Per-share price the buyer saw when quoting. Re-checked against the
    /// live valuation inside the transaction.
    pub quoted_price_per_share: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub order_id: i64,
    pub price_per_share: i64,
    pub amount: i64,
}

pub async fn purchase(
    pool: &SqlitePool,
    events: &mpsc::Sender<EngineEvent>,
    req: PurchaseRequest,
) -> Result<PurchaseReceipt> {
    // Validation: rejected before any side effect.
    if req.quantity <= 0 {
        return Err(AppError::Validation(format!(
            "quantity must be positive, got {}",
            req.quantity
        )));
    }
    if req.account_id.is_empty() || req.team_id.is_empty() {
        return Err(AppError::Validation("account and team ids must be non-empty".to_string()));
    }

    let now = now_secs();

    let mut tx = pool.begin().await?;

    // 1. Fresh gate check at order time, inside the transaction so the
    // decision and the writes share one view of the fixtures.
    let gate = evaluate_gate_on(&mut *tx, &req.team_id, now).await?;
    if !gate.open {
        return Err(BusinessRuleError::WindowClosed(gate.reason.to_string()).into());
    }

    // 2. Re-read the live per-share valuation.
    let team: TeamRow = sqlx::query_as("SELECT * FROM teams WHERE id = ?")
        .bind(&req.team_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("team", req.team_id.clone()))?;

    let price = team.price_per_share();
    if price != req.quoted_price_per_share {
        return Err(BusinessRuleError::PriceMismatch {
            quoted: req.quoted_price_per_share,
            current: price,
        }
        .into());
    }

    let amount = price
        .checked_mul(req.quantity)
        .ok_or_else(|| AppError::Validation("order amount overflows".to_string()))?;

    // Shares come out of the team's fixed float; total_shares itself never
    // changes.
    let reserved = sqlx::query(
        "UPDATE teams SET available_shares = available_shares - ?
         WHERE id = ? AND available_shares >= ?",
    )
    .bind(req.quantity)
    .bind(&req.team_id)
    .bind(req.quantity)
    .execute(&mut *tx)
    .await?;
    if reserved.rows_affected() == 0 {
        return Err(BusinessRuleError::InsufficientShares {
            available: team.available_shares,
            requested: req.quantity,
        }
        .into());
    }

    // 3. Debit cash. The balance predicate makes the debit conditional, so a
    // concurrent buyer can never push the wallet negative.
    let wallet: i64 = sqlx::query_scalar("SELECT wallet FROM accounts WHERE id = ?")
        .bind(&req.account_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("account", req.account_id.clone()))?;

    let debited = sqlx::query("UPDATE accounts SET wallet = wallet - ? WHERE id = ? AND wallet >= ?")
        .bind(amount)
        .bind(&req.account_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;
    if debited.rows_affected() == 0 {
        return Err(BusinessRuleError::InsufficientBalance { wallet, cost: amount }.into());
    }

    // 4. Increment the (account, team) position.
    sqlx::query(
        "INSERT INTO positions (account_id, team_id, quantity, invested)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(account_id, team_id) DO UPDATE SET
             quantity = quantity + excluded.quantity,
             invested = invested + excluded.invested",
    )
    .bind(&req.account_id)
    .bind(&req.team_id)
    .bind(req.quantity)
    .bind(amount)
    .execute(&mut *tx)
    .await?;

    // 5. Order record. Valuation before/after are equal: purchases never move
    // valuation in the fixed-share model.
    let order_id: i64 = sqlx::query_scalar(
        "INSERT INTO orders (account_id, team_id, quantity, price_per_share, amount,
                             valuation_before, valuation_after, placed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(&req.account_id)
    .bind(&req.team_id)
    .bind(req.quantity)
    .bind(price)
    .bind(amount)
    .bind(team.valuation)
    .bind(team.valuation)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        account_id = %req.account_id,
        team_id = %req.team_id,
        quantity = req.quantity,
        amount,
        order_id,
        "Purchase completed"
    );
    let event = EngineEvent::PurchaseCompleted {
        account_id: req.account_id,
        team_id: req.team_id,
        quantity: req.quantity,
        amount,
    };
    if let Err(e) = events.try_send(event) {
        warn!("Event channel full, dropping purchase event: {e}");
    }

    Ok(PurchaseReceipt { order_id, price_per_share: price, amount })
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;
    use crate::types::EngineEvent;

    fn events() -> (mpsc::Sender<EngineEvent>, mpsc::Receiver<EngineEvent>) {
        mpsc::channel(16)
    }

    async fn seed(pool: &SqlitePool, wallet: i64) {
        // 100_000 valuation / 1000 shares = 100 per share.
        testutil::insert_team(pool, "t1", 100_000, 1000).await;
        testutil::insert_account(pool, "alice", wallet).await;
    }

    #[tokio::test]
    async fn purchase_debits_wallet_and_builds_position() {
        let pool = testutil::pool().await;
        seed(&pool, 10_000).await;
        let (tx, mut rx) = events();

        let receipt = purchase(
            &pool,
            &tx,
            PurchaseRequest {
                account_id: "alice".into(),
                team_id: "t1".into(),
                quantity: 30,
                quoted_price_per_share: 100,
            },
        )
        .await
        .unwrap();

        assert_eq!(receipt.amount, 3_000);
        assert_eq!(testutil::account_wallet(&pool, "alice").await, 7_000);

        let (qty, invested): (i64, i64) = sqlx::query_as(
            "SELECT quantity, invested FROM positions WHERE account_id = 'alice' AND team_id = 't1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!((qty, invested), (30, 3_000));

        let available: i64 = sqlx::query_scalar("SELECT available_shares FROM teams WHERE id = 't1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(available, 970);

        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::PurchaseCompleted { amount: 3_000, .. }
        ));
    }

    #[tokio::test]
    async fn repeat_purchase_accumulates_the_same_position() {
        let pool = testutil::pool().await;
        seed(&pool, 10_000).await;
        let (tx, _rx) = events();

        for _ in 0..2 {
            purchase(
                &pool,
                &tx,
                PurchaseRequest {
                    account_id: "alice".into(),
                    team_id: "t1".into(),
                    quantity: 10,
                    quoted_price_per_share: 100,
                },
            )
            .await
            .unwrap();
        }

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM positions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
        let qty: i64 = sqlx::query_scalar(
            "SELECT quantity FROM positions WHERE account_id = 'alice' AND team_id = 't1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(qty, 20);
    }

    #[tokio::test]
    async fn insufficient_balance_leaves_no_rows_behind() {
        let pool = testutil::pool().await;
        seed(&pool, 500).await;
        let (tx, mut rx) = events();

        let err = purchase(
            &pool,
            &tx,
            PurchaseRequest {
                account_id: "alice".into(),
                team_id: "t1".into(),
                quantity: 30,
                quoted_price_per_share: 100,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::BusinessRule(BusinessRuleError::InsufficientBalance { wallet: 500, cost: 3_000 })
        ));

        assert_eq!(testutil::account_wallet(&pool, "alice").await, 500);
        let positions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM positions")
            .fetch_one(&pool)
            .await
            .unwrap();
        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!((positions, orders), (0, 0));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_quote_is_rejected() {
        let pool = testutil::pool().await;
        seed(&pool, 10_000).await;
        let (tx, _rx) = events();

        let err = purchase(
            &pool,
            &tx,
            PurchaseRequest {
                account_id: "alice".into(),
                team_id: "t1".into(),
                quantity: 1,
                quoted_price_per_share: 95,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::BusinessRule(BusinessRuleError::PriceMismatch { quoted: 95, current: 100 })
        ));
    }

    #[tokio::test]
    async fn window_closed_rejects_before_any_write() {
        let pool = testutil::pool().await;
        seed(&pool, 10_000).await;
        testutil::insert_team(&pool, "t2", 100_000, 1000).await;

        // Buy window closed an hour ago, kickoff still ahead of now.
        let now = now_secs();
        testutil::insert_fixture(&pool, "f1", "t1", "t2", now + 1800, now - 3600, "scheduled")
            .await;
        let (tx, _rx) = events();

        let err = purchase(
            &pool,
            &tx,
            PurchaseRequest {
                account_id: "alice".into(),
                team_id: "t1".into(),
                quantity: 1,
                quoted_price_per_share: 100,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::BusinessRule(BusinessRuleError::WindowClosed(_))
        ));
        assert_eq!(testutil::account_wallet(&pool, "alice").await, 10_000);
    }

    #[tokio::test]
    async fn cannot_buy_more_shares_than_the_float_holds() {
        let pool = testutil::pool().await;
        seed(&pool, 10_000_000).await;
        let (tx, _rx) = events();

        // Float is 1000 shares; drain it, then one more share must fail.
        sqlx::query("UPDATE teams SET available_shares = 1 WHERE id = 't1'")
            .execute(&pool)
            .await
            .unwrap();
        let err = purchase(
            &pool,
            &tx,
            PurchaseRequest {
                account_id: "alice".into(),
                team_id: "t1".into(),
                quantity: 2,
                quoted_price_per_share: 100,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::BusinessRule(BusinessRuleError::InsufficientShares { available: 1, requested: 2 })
        ));
        // Nothing debited, nothing reserved.
        assert_eq!(testutil::account_wallet(&pool, "alice").await, 10_000_000);
        let available: i64 = sqlx::query_scalar("SELECT available_shares FROM teams WHERE id = 't1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(available, 1);
    }

    #[tokio::test]
    async fn non_positive_quantity_is_rejected_up_front() {
        let pool = testutil::pool().await;
        seed(&pool, 10_000).await;
        let (tx, _rx) = events();

        let err = purchase(
            &pool,
            &tx,
            PurchaseRequest {
                account_id: "alice".into(),
                team_id: "t1".into(),
                quantity: 0,
                quoted_price_per_share: 100,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
