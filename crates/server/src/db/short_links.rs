//! Short link repository.
//!
//! Maps a random 8-character id to a target value (a verification token
//! hash) until it expires.

use chrono::{DateTime, Duration, Utc};
use rand::seq::IndexedRandom;
use sqlx::PgPool;

use pawdia_core::ShortLinkId;

use super::RepositoryError;

/// Attempts before giving up on finding an unused id.
const MAX_ATTEMPTS: usize = 5;

/// Repository for short links.
pub struct ShortLinkRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ShortLinkRepository<'a> {
    /// Create a new short link repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store `target` under a fresh id valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if no unused id was found.
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, target: &str, ttl: Duration) -> Result<ShortLinkId, RepositoryError> {
        let expires_at = Utc::now() + ttl;

        for _ in 0..MAX_ATTEMPTS {
            let id = generate_id()?;
            let inserted = sqlx::query(
                "INSERT INTO short_links (id, target, expires_at) VALUES ($1, $2, $3) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(id.as_str())
            .bind(target)
            .bind(expires_at)
            .execute(self.pool)
            .await?;

            if inserted.rows_affected() == 1 {
                return Ok(id);
            }
            tracing::warn!(short_id = %id, "short link id collision, retrying");
        }

        Err(RepositoryError::Conflict(
            "could not allocate a short link id".to_owned(),
        ))
    }

    /// Resolve an id to its target.
    ///
    /// Expired links still resolve until [`Self::purge_expired`] removes
    /// them, so the target's own expiry decides the outcome.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn resolve(&self, id: &ShortLinkId) -> Result<Option<String>, RepositoryError> {
        let target = sqlx::query_scalar(
            "SELECT target FROM short_links WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(target)
    }

    /// Delete links that expired before `now`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM short_links WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Generate a random id from the short link alphabet.
fn generate_id() -> Result<ShortLinkId, RepositoryError> {
    let mut rng = rand::rng();
    let raw: String = (0..ShortLinkId::LEN)
        .filter_map(|_| ShortLinkId::ALPHABET.choose(&mut rng).copied().map(char::from))
        .collect();

    ShortLinkId::parse(&raw)
        .map_err(|e| RepositoryError::DataCorruption(format!("generated short link id: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_generate_id_is_valid() {
        for _ in 0..100 {
            let id = generate_id().unwrap();
            assert_eq!(id.as_str().len(), ShortLinkId::LEN);
            assert!(ShortLinkId::parse(id.as_str()).is_ok());
        }
    }

    #[test]
    fn test_generate_id_varies() {
        let ids: HashSet<String> = (0..50).map(|_| generate_id().unwrap().to_string()).collect();
        assert!(ids.len() > 45);
    }
}
