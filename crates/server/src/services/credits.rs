//! Credit spending and refunds on top of the ledger.

use sqlx::PgPool;
use thiserror::Error;

use pawdia_core::{Credits, UserId};

use crate::db::{Adjustment, CreditLedger, CreditReason, RepositoryError};

/// Largest single adjustment accepted from a request.
pub const MAX_ADJUSTMENT: u32 = 100_000;

/// Errors from credit operations.
#[derive(Debug, Error)]
pub enum CreditError {
    /// The balance does not cover the debit.
    #[error("insufficient credits: {required} required")]
    Insufficient { required: u32 },

    /// Amount is zero or out of range.
    #[error("amount must be between 1 and {MAX_ADJUSTMENT}")]
    InvalidAmount,

    /// User does not exist.
    #[error("user not found")]
    UserNotFound,

    /// Database operation failed.
    #[error("repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for CreditError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::UserNotFound,
            other => Self::Repository(other),
        }
    }
}

/// Credit operations for a user.
pub struct CreditService<'a> {
    ledger: CreditLedger<'a>,
}

impl<'a> CreditService<'a> {
    /// Create a new credit service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            ledger: CreditLedger::new(pool),
        }
    }

    /// Debit `amount` credits. Fails without changing anything if the
    /// balance is too low.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::Insufficient` if the balance doesn't cover `amount`.
    /// Returns `CreditError::InvalidAmount` for zero or oversized amounts.
    pub async fn spend(
        &self,
        user_id: UserId,
        amount: u32,
        reason: CreditReason,
        reference: Option<&str>,
    ) -> Result<Credits, CreditError> {
        let delta = checked_delta(amount)?;
        match self.ledger.adjust(user_id, -delta, reason, reference).await? {
            Adjustment::Applied(balance) => Ok(balance),
            Adjustment::Insufficient => Err(CreditError::Insufficient { required: amount }),
        }
    }

    /// Credit `amount` back to the balance.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::InvalidAmount` for zero or oversized amounts.
    pub async fn grant(
        &self,
        user_id: UserId,
        amount: u32,
        reason: CreditReason,
        reference: Option<&str>,
    ) -> Result<Credits, CreditError> {
        let delta = checked_delta(amount)?;
        match self.ledger.adjust(user_id, delta, reason, reference).await? {
            Adjustment::Applied(balance) => Ok(balance),
            // A positive delta can't underflow
            Adjustment::Insufficient => Err(CreditError::Insufficient { required: 0 }),
        }
    }

    /// Apply a signed admin adjustment. Removals never take the balance below zero.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::Insufficient` if a removal exceeds the balance.
    pub async fn admin_adjust(
        &self,
        user_id: UserId,
        amount: i32,
        note: Option<&str>,
    ) -> Result<Credits, CreditError> {
        if amount == 0 || amount.unsigned_abs() > MAX_ADJUSTMENT {
            return Err(CreditError::InvalidAmount);
        }

        match self
            .ledger
            .adjust(user_id, amount, CreditReason::AdminAdjustment, note)
            .await?
        {
            Adjustment::Applied(balance) => Ok(balance),
            Adjustment::Insufficient => Err(CreditError::Insufficient {
                required: amount.unsigned_abs(),
            }),
        }
    }
}

fn checked_delta(amount: u32) -> Result<i32, CreditError> {
    if amount == 0 || amount > MAX_ADJUSTMENT {
        return Err(CreditError::InvalidAmount);
    }
    i32::try_from(amount).map_err(|_| CreditError::InvalidAmount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_delta_bounds() {
        assert!(matches!(checked_delta(0), Err(CreditError::InvalidAmount)));
        assert_eq!(checked_delta(1).ok(), Some(1));
        assert_eq!(checked_delta(MAX_ADJUSTMENT).ok(), Some(100_000));
        assert!(checked_delta(MAX_ADJUSTMENT + 1).is_err());
    }

    #[test]
    fn test_not_found_maps_to_user_not_found() {
        assert!(matches!(
            CreditError::from(RepositoryError::NotFound),
            CreditError::UserNotFound
        ));
        assert!(matches!(
            CreditError::from(RepositoryError::Conflict("x".to_owned())),
            CreditError::Repository(_)
        ));
    }
}
