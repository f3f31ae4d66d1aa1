//! Admin access management.

use pawdia_server::db::UserRepository;

use super::{CommandError, connect, find_user};

/// Grant or revoke admin access for the user with `email`.
pub async fn set_admin(email: &str, is_admin: bool) -> Result<(), CommandError> {
    let pool = connect().await?;
    let user = find_user(&pool, email).await?;

    if user.is_admin == is_admin {
        tracing::info!(user_id = %user.id, is_admin, "Admin access already set, nothing to do");
        return Ok(());
    }

    UserRepository::new(&pool).set_admin(user.id, is_admin).await?;
    tracing::info!(user_id = %user.id, %email, is_admin, "Admin access updated");
    Ok(())
}
