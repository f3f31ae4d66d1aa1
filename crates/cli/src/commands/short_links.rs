//! Short link maintenance.

use chrono::Utc;
use pawdia_server::db::ShortLinkRepository;

use super::{CommandError, connect};

/// Delete short links that expired before now.
pub async fn purge() -> Result<u64, CommandError> {
    let pool = connect().await?;

    let deleted = ShortLinkRepository::new(&pool)
        .purge_expired(Utc::now())
        .await?;

    tracing::info!(deleted, "Expired short links purged");
    Ok(deleted)
}
