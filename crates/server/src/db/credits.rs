//! Credit ledger.
//!
//! Every balance change is a single conditional `UPDATE` plus an insert into
//! `credit_transactions`, both in one transaction. The `credits + delta >= 0`
//! guard makes debits race-free: two concurrent debits can never both pass
//! against the same balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use pawdia_core::{CreditTransactionId, Credits, UserId};

use super::RepositoryError;

/// Why a balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "credit_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreditReason {
    SignupBonus,
    Purchase,
    Subscription,
    Generation,
    Usage,
    Refund,
    AdminAdjustment,
}

/// One ledger entry.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransaction {
    pub id: CreditTransactionId,
    pub user_id: UserId,
    /// Signed change (positive = credit, negative = debit).
    pub delta: i32,
    pub balance_after: i32,
    pub reason: CreditReason,
    /// Order id or other correlation value.
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a balance adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// The change was applied.
    Applied(Credits),
    /// A debit exceeded the balance. Nothing changed.
    Insufficient,
}

/// Repository for credit balance changes.
pub struct CreditLedger<'a> {
    pool: &'a PgPool,
}

impl<'a> CreditLedger<'a> {
    /// Create a new ledger.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Apply a signed change to a user's balance.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn adjust(
        &self,
        user_id: UserId,
        delta: i32,
        reason: CreditReason,
        reference: Option<&str>,
    ) -> Result<Adjustment, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let outcome = match apply_adjustment(&mut tx, user_id, delta, reason, reference).await? {
            Some(balance) => Adjustment::Applied(balance),
            None => {
                // Distinguish a missing user from a short balance
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                        .bind(user_id)
                        .fetch_one(&mut *tx)
                        .await?;
                if !exists {
                    return Err(RepositoryError::NotFound);
                }
                Adjustment::Insufficient
            }
        };

        tx.commit().await?;

        Ok(outcome)
    }

    /// Most recent ledger entries for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn history(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<CreditTransaction>, RepositoryError> {
        let rows = sqlx::query_as::<_, CreditTransaction>(
            "SELECT id, user_id, delta, balance_after, reason, reference, created_at \
             FROM credit_transactions WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit.clamp(1, 500))
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }
}

/// Apply a change on an open transaction.
///
/// Returns the new balance, or `None` if the user is missing or a debit
/// would take the balance below zero. A zero delta is a no-op read.
pub(crate) async fn apply_adjustment(
    conn: &mut PgConnection,
    user_id: UserId,
    delta: i32,
    reason: CreditReason,
    reference: Option<&str>,
) -> Result<Option<Credits>, RepositoryError> {
    if delta == 0 {
        let balance: Option<i32> = sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
        return balance.map(to_credits).transpose();
    }

    let balance: Option<i32> = sqlx::query_scalar(
        "UPDATE users SET credits = credits + $2, updated_at = NOW() \
         WHERE id = $1 AND credits + $2 >= 0 RETURNING credits",
    )
    .bind(user_id)
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_overflow)?;

    let Some(balance) = balance else {
        return Ok(None);
    };

    sqlx::query(
        "INSERT INTO credit_transactions (user_id, delta, balance_after, reason, reference) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(user_id)
    .bind(delta)
    .bind(balance)
    .bind(reason)
    .bind(reference)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(%user_id, delta, balance, ?reason, "credit balance adjusted");

    to_credits(balance).map(Some)
}

fn to_credits(value: i32) -> Result<Credits, RepositoryError> {
    Credits::new(value)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid credit balance: {e}")))
}

/// Integer overflow (SQLSTATE 22003) surfaces as a conflict rather than a 500.
fn map_overflow(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.code().as_deref() == Some("22003")
    {
        return RepositoryError::Conflict("credit balance overflow".to_owned());
    }
    RepositoryError::Database(err)
}
