//! CLI command implementations.

pub mod admin;
pub mod credits;
pub mod migrate;
pub mod seed;
pub mod short_links;

use pawdia_core::{Email, EmailError};
use pawdia_server::db::{self, RepositoryError, UserRepository};
use pawdia_server::models::User;
use pawdia_server::services::credits::CreditError;
use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Repository operation failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Credit adjustment failed.
    #[error("Credit error: {0}")]
    Credit(#[from] CreditError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// No user with this email.
    #[error("No user with email: {0}")]
    UserNotFound(String),
}

/// Connect to the database named by `DATABASE_URL`.
pub async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL")
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    Ok(db::create_pool(&database_url).await?)
}

/// Look up a user by email.
pub async fn find_user(pool: &PgPool, email: &str) -> Result<User, CommandError> {
    let parsed = Email::parse(email)?;
    UserRepository::new(pool)
        .get_by_email(&parsed)
        .await?
        .ok_or_else(|| CommandError::UserNotFound(email.to_owned()))
}
