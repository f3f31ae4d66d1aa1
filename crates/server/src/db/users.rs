//! User repository for database operations.
//!
//! Token columns only ever hold SHA-256 digests. Callers hash the raw token
//! from the email link before looking it up.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use pawdia_core::{
    Credits, Email, Subscription, SubscriptionPlan, SubscriptionStatus, UserId,
};

use super::RepositoryError;
use super::credits::{CreditReason, apply_adjustment};
use crate::models::User;

const USER_COLUMNS: &str = "id, name, email, credits, subscription_plan, subscription_status, \
     subscription_expires_at, is_admin, is_verified, created_at, updated_at";

/// Result of redeeming an email verification token.
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    /// The account was verified by this call.
    Verified(User),
    /// The account was already verified (link clicked twice).
    AlreadyVerified(User),
    /// The token matched but has expired.
    Expired,
    /// No account matches the token.
    Invalid,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: UserId,
    name: String,
    email: String,
    credits: i32,
    subscription_plan: SubscriptionPlan,
    subscription_status: SubscriptionStatus,
    subscription_expires_at: Option<DateTime<Utc>>,
    is_admin: bool,
    is_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&r.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let credits = Credits::new(r.credits).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid credits for user {}: {e}", r.id))
        })?;

        Ok(Self {
            id: r.id,
            name: r.name,
            email,
            credits,
            subscription: Subscription {
                plan: r.subscription_plan,
                status: r.subscription_status,
                expires_at: r.subscription_expires_at,
            },
            is_admin: r.is_admin,
            is_verified: r.is_verified,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VerificationRow {
    id: UserId,
    is_verified: bool,
    verification_token_expires_at: Option<DateTime<Utc>>,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a user and record the signup bonus in the credit ledger.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        name: &str,
        email: &Email,
        password_hash: &str,
        initial_credits: u32,
    ) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(name)
        .bind(email.as_str())
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "email already exists"))?;

        let mut user = User::try_from(row)?;

        if initial_credits > 0 {
            let delta = i32::try_from(initial_credits).map_err(|_| {
                RepositoryError::DataCorruption("signup bonus out of range".to_owned())
            })?;
            let balance =
                apply_adjustment(&mut tx, user.id, delta, CreditReason::SignupBonus, None)
                    .await?
                    .ok_or_else(|| {
                        RepositoryError::DataCorruption("signup bonus rejected".to_owned())
                    })?;
            user.credits = balance;
        }

        tx.commit().await?;

        Ok(user)
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the row is invalid.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the row is invalid.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email.as_str())
                .fetch_optional(self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    /// Get a user together with their password hash, for login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            #[sqlx(flatten)]
            user: UserRow,
            password_hash: String,
        }

        let row: Option<Row> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| Ok((User::try_from(r.user)?, r.password_hash)))
            .transpose()
    }

    /// Get the password hash for a user ID (for password changes).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn get_password_hash_by_id(&self, id: UserId) -> Result<String, RepositoryError> {
        sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// List users, newest first, optionally filtered by a name/email substring.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        page: u32,
        per_page: u32,
        search: Option<&str>,
    ) -> Result<Vec<User>, RepositoryError> {
        let (limit, offset) = super::page_bounds(page, per_page);
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE $1::text IS NULL OR name ILIKE $1 OR email ILIKE $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(search.map(like_pattern))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    /// Count users matching the same filter as [`Self::list`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, search: Option<&str>) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users \
             WHERE $1::text IS NULL OR name ILIKE $1 OR email ILIKE $1",
        )
        .bind(search.map(like_pattern))
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }

    /// Update the display name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn update_profile(&self, id: UserId, name: &str) -> Result<User, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET name = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Grant or revoke admin access.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn set_admin(&self, id: UserId, is_admin: bool) -> Result<User, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET is_admin = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(is_admin)
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Replace the password hash and invalidate any outstanding reset token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn set_password(&self, id: UserId, password_hash: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, reset_token_hash = NULL, \
             reset_token_expires_at = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Store a new verification token hash, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn set_verification_token(
        &self,
        id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET verification_token_hash = $2, verification_token_expires_at = $3, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Redeem a verification token.
    ///
    /// The token hash is kept after verification so that a repeated click
    /// resolves to [`VerifyOutcome::AlreadyVerified`] instead of an error.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn verify_by_token(&self, token_hash: &str) -> Result<VerifyOutcome, RepositoryError> {
        let row: Option<VerificationRow> = sqlx::query_as(
            "SELECT id, is_verified, verification_token_expires_at FROM users \
             WHERE verification_token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(VerifyOutcome::Invalid);
        };

        if row.is_verified {
            let user = self.get_by_id(row.id).await?.ok_or(RepositoryError::NotFound)?;
            return Ok(VerifyOutcome::AlreadyVerified(user));
        }

        if row
            .verification_token_expires_at
            .is_none_or(|exp| exp <= Utc::now())
        {
            return Ok(VerifyOutcome::Expired);
        }

        let updated: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET is_verified = TRUE, verified_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND is_verified = FALSE RETURNING {USER_COLUMNS}"
        ))
        .bind(row.id)
        .fetch_optional(self.pool)
        .await?;

        match updated {
            Some(r) => Ok(VerifyOutcome::Verified(r.try_into()?)),
            // Lost a race with a concurrent click
            None => {
                let user = self.get_by_id(row.id).await?.ok_or(RepositoryError::NotFound)?;
                Ok(VerifyOutcome::AlreadyVerified(user))
            }
        }
    }

    /// Store a password reset token hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn set_reset_token(
        &self,
        id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET reset_token_hash = $2, reset_token_expires_at = $3, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Consume a reset token and set a new password in one statement.
    ///
    /// Returns `None` if the token is unknown or expired. The token is
    /// cleared so it cannot be reused.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn reset_password_by_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET password_hash = $2, reset_token_hash = NULL, \
             reset_token_expires_at = NULL, updated_at = NOW() \
             WHERE reset_token_hash = $1 AND reset_token_expires_at > NOW() \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(token_hash)
        .bind(new_password_hash)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Mark an active, unexpired subscription as cancelled.
    ///
    /// Only the status changes, so a renewal committed concurrently keeps its
    /// new expiry. Returns `None` if there was nothing to cancel.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn cancel_subscription(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET subscription_status = 'cancelled', updated_at = NOW() \
             WHERE id = $1 AND subscription_status = 'active' \
             AND subscription_expires_at > NOW() RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Delete a user. Orders and ledger entries cascade.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Replace the subscription record on an existing connection or transaction.
pub(crate) async fn set_subscription_in(
    conn: &mut PgConnection,
    id: UserId,
    subscription: &Subscription,
) -> Result<User, RepositoryError> {
    let row: Option<UserRow> = sqlx::query_as(&format!(
        "UPDATE users SET subscription_plan = $2, subscription_status = $3, \
         subscription_expires_at = $4, updated_at = NOW() WHERE id = $1 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(subscription.plan)
    .bind(subscription.status)
    .bind(subscription.expires_at)
    .fetch_optional(&mut *conn)
    .await?;

    row.ok_or(RepositoryError::NotFound)?.try_into()
}

/// Lock a user's row and read its subscription.
pub(crate) async fn lock_subscription(
    conn: &mut PgConnection,
    id: UserId,
) -> Result<Subscription, RepositoryError> {
    let row: Option<(SubscriptionPlan, SubscriptionStatus, Option<DateTime<Utc>>)> =
        sqlx::query_as(
            "SELECT subscription_plan, subscription_status, subscription_expires_at \
             FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let (plan, status, expires_at) = row.ok_or(RepositoryError::NotFound)?;
    Ok(Subscription {
        plan,
        status,
        expires_at,
    })
}

/// Build an `ILIKE` pattern that matches `term` anywhere, escaping wildcards.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" mochi "), "%mochi%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
