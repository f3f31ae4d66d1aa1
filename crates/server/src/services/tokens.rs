//! Access tokens (JWT) and one-time email tokens.
//!
//! One-time tokens are 32 random bytes, hex-encoded for the email link. Only
//! the SHA-256 digest is stored, so a database leak does not expose usable
//! verification or reset links.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use pawdia_core::UserId;

use crate::config::{JWT_TTL_HOURS_RANGE, JwtConfig};
use crate::models::User;

/// How long an email verification link stays valid.
pub const VERIFICATION_TOKEN_TTL: Duration = Duration::hours(24);

/// How long a password reset link stays valid.
pub const RESET_TOKEN_TTL: Duration = Duration::hours(1);

/// Errors from token issuance or validation.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Token is malformed, has a bad signature, or is expired.
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    /// The `sub` claim is not a user id.
    #[error("invalid subject claim")]
    InvalidSubject,
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub admin: bool,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Parse the subject as a user id.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidSubject` if `sub` is not an integer.
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.sub
            .parse::<i32>()
            .map(UserId::new)
            .map_err(|_| TokenError::InvalidSubject)
    }
}

/// Issues and validates HS256 access tokens.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtManager {
    /// Create a manager from configuration.
    ///
    /// The lifetime is clamped to [`JWT_TTL_HOURS_RANGE`].
    #[must_use]
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        let hours = config
            .ttl_hours
            .clamp(*JWT_TTL_HOURS_RANGE.start(), *JWT_TTL_HOURS_RANGE.end());
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl: Duration::hours(hours),
        }
    }

    /// Issue an access token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Invalid` if encoding fails.
    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.to_string(),
            admin: user.is_admin,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Validate a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Invalid` on a bad signature, wrong algorithm, or expiry.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

/// A freshly generated one-time token.
#[derive(Debug, Clone)]
pub struct OneTimeToken {
    /// Hex string sent to the user.
    pub raw: String,
    /// SHA-256 digest stored in the database.
    pub hash: String,
}

impl OneTimeToken {
    /// Generate 32 random bytes.
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::random();
        let raw = hex::encode(bytes);
        let hash = hash_token(&raw);
        Self { raw, hash }
    }
}

/// SHA-256 digest of a raw token, hex-encoded.
#[must_use]
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.trim().as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pawdia_core::{Credits, Email, Subscription};
    use secrecy::SecretString;

    use super::*;

    fn manager(secret: &str, ttl_hours: i64) -> JwtManager {
        JwtManager::new(&JwtConfig {
            secret: SecretString::from(secret),
            ttl_hours,
        })
    }

    fn user(is_admin: bool) -> User {
        User {
            id: UserId::new(7),
            name: "Biscuit".to_owned(),
            email: Email::parse("biscuit@pawdia.ai").unwrap(),
            credits: Credits::ZERO,
            subscription: Subscription::default(),
            is_admin,
            is_verified: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_and_validate() {
        let jwt = manager("a-very-long-test-secret-with-enough-bytes", 1);
        let token = jwt.issue(&user(true)).unwrap();

        let claims = jwt.validate(&token).unwrap();
        assert_eq!(claims.user_id().unwrap(), UserId::new(7));
        assert_eq!(claims.email, "biscuit@pawdia.ai");
        assert!(claims.admin);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let token = manager("first-secret-first-secret-first-secret", 1)
            .issue(&user(false))
            .unwrap();
        assert!(
            manager("other-secret-other-secret-other-secret", 1)
                .validate(&token)
                .is_err()
        );
    }

    #[test]
    fn test_expired_token_fails() {
        let jwt = manager("a-very-long-test-secret-with-enough-bytes", 1);
        // Past the default 60 s leeway
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "7".to_owned(),
            email: "biscuit@pawdia.ai".to_owned(),
            admin: false,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token =
            jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &jwt.encoding_key)
                .unwrap();
        assert!(jwt.validate(&token).is_err());
    }

    #[test]
    fn test_out_of_range_ttl_is_clamped() {
        let claims = |ttl_hours| {
            let jwt = manager("a-very-long-test-secret-with-enough-bytes", ttl_hours);
            jwt.validate(&jwt.issue(&user(false)).unwrap()).unwrap()
        };

        let short = claims(0);
        assert_eq!(short.exp - short.iat, 3600);

        let long = claims(i64::MAX / 2);
        assert_eq!(long.exp - long.iat, 8760 * 3600);
    }

    #[test]
    fn test_garbage_token_fails() {
        let jwt = manager("a-very-long-test-secret-with-enough-bytes", 1);
        assert!(jwt.validate("not.a.jwt").is_err());
    }

    #[test]
    fn test_one_time_token_shape() {
        let token = OneTimeToken::generate();
        assert_eq!(token.raw.len(), 64);
        assert_eq!(token.hash.len(), 64);
        assert_ne!(token.raw, token.hash);
        assert_eq!(hash_token(&token.raw), token.hash);
        assert_ne!(OneTimeToken::generate().raw, token.raw);
    }

    #[test]
    fn test_hash_token_ignores_surrounding_whitespace() {
        assert_eq!(hash_token(" abc \n"), hash_token("abc"));
    }
}
