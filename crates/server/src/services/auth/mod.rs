//! Authentication service.
//!
//! Password accounts with email verification and password reset. Tokens for
//! both flows are generated in [`crate::services::tokens`]; this service only
//! ever stores their hashes.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use sqlx::PgPool;

use pawdia_core::{Email, ShortLinkId, UserId};

use crate::db::{RepositoryError, ShortLinkRepository, UserRepository, VerifyOutcome};
use crate::models::User;
use crate::services::tokens::{
    OneTimeToken, RESET_TOKEN_TTL, VERIFICATION_TOKEN_TTL, hash_token,
};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length (bounds hashing cost).
const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum display name length.
const MAX_NAME_LENGTH: usize = 100;

/// A verification link ready to be emailed.
#[derive(Debug, Clone)]
pub struct VerificationLink {
    /// Raw token for `?token=` links.
    pub token: String,
    /// Short id for `/verify/{id}` links.
    pub short_id: ShortLinkId,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    short_links: ShortLinkRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
            short_links: ShortLinkRepository::new(pool),
        }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new user with name, email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::InvalidName` if the name is empty or too long.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        signup_bonus: u32,
    ) -> Result<User, AuthError> {
        let name = validate_name(name)?;
        let email = Email::parse(email)?;
        validate_password(password)?;

        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create(name, &email, &password_hash, signup_bonus)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "user registered");

        Ok(user)
    }

    /// Login with email and password.
    ///
    /// Unknown emails and wrong passwords produce the same error.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        Ok(user)
    }

    /// Change the password of a signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if `current` is wrong.
    /// Returns `AuthError::WeakPassword` if `new` doesn't meet requirements.
    pub async fn change_password(
        &self,
        user_id: UserId,
        current: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        let stored = self
            .users
            .get_password_hash_by_id(user_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::UserNotFound,
                other => AuthError::Repository(other),
            })?;

        verify_password(current, &stored)?;
        validate_password(new)?;

        let password_hash = hash_password(new)?;
        self.users.set_password(user_id, &password_hash).await?;

        tracing::info!(%user_id, "password changed");
        Ok(())
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    // =========================================================================
    // Email Verification
    // =========================================================================

    /// Create a fresh verification token and short link for `user`.
    ///
    /// Any earlier token stops working.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn issue_verification(&self, user: &User) -> Result<VerificationLink, AuthError> {
        let token = OneTimeToken::generate();
        let expires_at = Utc::now() + VERIFICATION_TOKEN_TTL;

        self.users
            .set_verification_token(user.id, &token.hash, expires_at)
            .await?;
        let short_id = self
            .short_links
            .create(&token.hash, VERIFICATION_TOKEN_TTL)
            .await?;

        Ok(VerificationLink {
            token: token.raw,
            short_id,
        })
    }

    /// Redeem a raw verification token from an email link.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn verify_email(&self, raw_token: &str) -> Result<VerifyOutcome, AuthError> {
        if raw_token.trim().is_empty() {
            return Ok(VerifyOutcome::Invalid);
        }
        Ok(self.users.verify_by_token(&hash_token(raw_token)).await?)
    }

    /// Redeem a verification short link.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn verify_short_link(&self, short_id: &str) -> Result<VerifyOutcome, AuthError> {
        let Ok(short_id) = ShortLinkId::parse(short_id) else {
            return Ok(VerifyOutcome::Invalid);
        };

        match self.short_links.resolve(&short_id).await? {
            Some(token_hash) => Ok(self.users.verify_by_token(&token_hash).await?),
            None => Ok(VerifyOutcome::Invalid),
        }
    }

    /// Look up an unverified user for resending the verification email.
    ///
    /// Returns `None` for unknown, malformed, or already verified addresses.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn find_unverified(&self, email: &str) -> Result<Option<User>, AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(None);
        };
        Ok(self
            .users
            .get_by_email(&email)
            .await?
            .filter(|u| !u.is_verified))
    }

    // =========================================================================
    // Password Reset
    // =========================================================================

    /// Start a password reset.
    ///
    /// Returns `None` if no account matches, so callers can respond the same
    /// way either way.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn start_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<(User, OneTimeToken)>, AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(None);
        };
        let Some(user) = self.users.get_by_email(&email).await? else {
            return Ok(None);
        };

        let token = OneTimeToken::generate();
        self.users
            .set_reset_token(user.id, &token.hash, Utc::now() + RESET_TOKEN_TTL)
            .await?;

        Ok(Some((user, token)))
    }

    /// Complete a password reset.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` if the new password doesn't meet requirements.
    /// Returns `AuthError::InvalidToken` if the token is unknown, used, or expired.
    pub async fn reset_password(&self, raw_token: &str, new_password: &str) -> Result<User, AuthError> {
        validate_password(new_password)?;
        let password_hash = hash_password(new_password)?;

        let user = self
            .users
            .reset_password_by_token(&hash_token(raw_token), &password_hash)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        tracing::info!(user_id = %user.id, "password reset");
        Ok(user)
    }
}

/// Validate a display name and return it trimmed.
fn validate_name(name: &str) -> Result<&str, AuthError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::InvalidName("name is required".to_owned()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidName(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name)
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Mochi  ").unwrap(), "Mochi");
        assert!(matches!(validate_name("   "), Err(AuthError::InvalidName(_))));
        assert!(validate_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong password", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_password_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }
}
