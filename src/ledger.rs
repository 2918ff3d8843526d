//! Cash ledger: the one idempotent wallet-credit operation. Duplicate
//! idempotency refs never double-credit.

use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::SqlitePool;
use tracing::info;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited { new_wallet: i64 },
    /// The ref was already used; the wallet is untouched.
    Duplicate,
}

pub async fn credit_wallet(
    pool: &SqlitePool,
    account_id: &str,
    amount: i64,
    idempotency_ref: &str,
) -> Result<CreditOutcome> {
    if amount <= 0 {
        return Err(AppError::Validation(format!("credit amount must be positive, got {amount}")));
    }
    if idempotency_ref.is_empty() {
        return Err(AppError::Validation("idempotency ref must be non-empty".to_string()));
    }

    let mut tx = pool.begin().await?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM accounts WHERE id = ?")
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("account", account_id.to_string()));
    }

    // The primary key on idempotency_ref is the dedup guard.
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO wallet_credits (idempotency_ref, account_id, amount, credited_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(idempotency_ref)
    .bind(account_id)
    .bind(amount)
    .bind(now_secs())
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        return Ok(CreditOutcome::Duplicate);
    }

    let new_wallet: i64 = sqlx::query_scalar(
        "UPDATE accounts SET wallet = wallet + ? WHERE id = ? RETURNING wallet",
    )
    .bind(amount)
    .bind(account_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(account_id = %account_id, amount, idempotency_ref = %idempotency_ref, "Wallet credited");
    Ok(CreditOutcome::Credited { new_wallet })
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
