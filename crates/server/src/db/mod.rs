//! Database operations for the Pawdia `PostgreSQL` database.
//!
//! ## Tables
//!
//! - `users` - Accounts, credit balance, subscription, verification/reset token hashes
//! - `credit_transactions` - Append-only ledger of every balance change
//! - `products` - Portrait catalogue
//! - `orders` - PayPal-backed orders (products, credit packs, subscriptions)
//! - `short_links` - Short ids for verification links
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p pawdia-cli -- migrate
//! ```

pub mod credits;
pub mod orders;
pub mod products;
pub mod short_links;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use credits::{Adjustment, CreditLedger, CreditReason, CreditTransaction};
pub use orders::{NewOrder, OrderRepository, OrderStats};
pub use products::{NewProduct, ProductRepository, ProductUpdate};
pub use short_links::ShortLinkRepository;
pub use users::{UserRepository, VerifyOutcome};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique violation to `Conflict` with the given message.
    pub(crate) fn from_unique(err: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Convert a page number (1-based) and page size into `LIMIT`/`OFFSET`.
#[must_use]
pub fn page_bounds(page: u32, per_page: u32) -> (i64, i64) {
    let per_page = per_page.clamp(1, 100);
    let page = page.max(1);
    let limit = i64::from(per_page);
    (limit, i64::from(page - 1) * limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(1, 20), (20, 0));
        assert_eq!(page_bounds(3, 20), (20, 40));
        assert_eq!(page_bounds(0, 0), (1, 0));
        assert_eq!(page_bounds(2, 500), (100, 100));
    }
}
