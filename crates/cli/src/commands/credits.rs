//! Manual credit adjustments.
//!
//! Uses the same ledger statement as the admin API, so a removal can never
//! take a balance below zero.

use pawdia_server::services::credits::CreditService;

use super::{CommandError, connect, find_user};

/// Apply `amount` credits to the user with `email`.
pub async fn add(email: &str, amount: i32, reason: Option<&str>) -> Result<(), CommandError> {
    let pool = connect().await?;
    let user = find_user(&pool, email).await?;

    let balance = CreditService::new(&pool)
        .admin_adjust(user.id, amount, reason.or(Some("cli")))
        .await?;

    tracing::info!(user_id = %user.id, %email, amount, %balance, "Credits adjusted");
    Ok(())
}
