//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `JWT_SECRET` - HS256 signing secret (min 32 chars, high entropy)
//! - `PUBLIC_BASE_URL` - Public URL of this API (used in email links)
//! - `FRONTEND_URL` - URL of the single-page frontend (redirects, CORS default)
//!
//! ## Optional
//! - `HOST` - Bind address (default: 127.0.0.1)
//! - `PORT` - Listen port (default: 3000)
//! - `JWT_TTL_HOURS` - Access token lifetime (default: 168)
//! - `SIGNUP_BONUS_CREDITS` - Credits granted on registration (default: 3)
//! - `GENERATION_COST_CREDITS` - Credits consumed per generation (default: 1)
//! - `REQUIRE_EMAIL_VERIFICATION` - Block generation for unverified accounts (default: false)
//! - `CORS_ORIGINS` - Comma-separated allowed origins (default: `FRONTEND_URL`)
//! - `PAYPAL_CLIENT_ID`, `PAYPAL_CLIENT_SECRET`, `PAYPAL_MODE` (`sandbox`|`live`)
//! - `RESEND_API_KEY`, `EMAIL_FROM`
//! - `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY`, `CLOUDINARY_API_SECRET`
//! - `AI_API_BASE_URL`, `AI_API_KEY`, `AI_MODEL`
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//! - `LOG_FORMAT` - `json` for structured logs, anything else for human-readable
//!
//! Each optional integration is enabled only when all of its variables are set.

use std::collections::HashMap;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Accepted access token lifetimes, one hour to one year.
pub const JWT_TTL_HOURS_RANGE: RangeInclusive<i64> = 1..=8760;

/// Accepted credit cost of one generation.
pub const GENERATION_COST_RANGE: RangeInclusive<u32> = 1..=1000;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the API (no trailing slash)
    pub public_base_url: String,
    /// Frontend URL (no trailing slash)
    pub frontend_url: String,
    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
    /// JWT issuance settings
    pub jwt: JwtConfig,
    /// Credit economy settings
    pub credits: CreditsConfig,
    /// PayPal REST API credentials
    pub paypal: Option<PayPalConfig>,
    /// Resend transactional email settings
    pub email: Option<EmailConfig>,
    /// Cloudinary upload settings
    pub cloudinary: Option<CloudinaryConfig>,
    /// AI image generation API settings
    pub ai: Option<AiConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry performance sample rate
    pub sentry_traces_sample_rate: f32,
}

/// JWT settings.
#[derive(Clone)]
pub struct JwtConfig {
    /// HS256 signing secret
    pub secret: SecretString,
    /// Token lifetime in hours
    pub ttl_hours: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("ttl_hours", &self.ttl_hours)
            .finish()
    }
}

/// Credit economy settings.
#[derive(Debug, Clone, Copy)]
pub struct CreditsConfig {
    /// Credits granted when an account is created
    pub signup_bonus: u32,
    /// Credits consumed by one AI generation
    pub generation_cost: u32,
    /// Whether generation requires a verified email address
    pub require_verified_email: bool,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            signup_bonus: 3,
            generation_cost: 1,
            require_verified_email: false,
        }
    }
}

/// PayPal environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayPalMode {
    Sandbox,
    Live,
}

impl PayPalMode {
    /// REST API base URL for this environment.
    #[must_use]
    pub const fn api_base(self) -> &'static str {
        match self {
            Self::Sandbox => "https://api-m.sandbox.paypal.com",
            Self::Live => "https://api-m.paypal.com",
        }
    }
}

/// PayPal REST API configuration.
#[derive(Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub mode: PayPalMode,
}

impl std::fmt::Debug for PayPalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayPalConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("mode", &self.mode)
            .finish()
    }
}

/// Resend email configuration.
#[derive(Clone)]
pub struct EmailConfig {
    pub api_key: SecretString,
    /// Sender, e.g. `Pawdia <hello@pawdia.ai>`
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("api_key", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Cloudinary configuration.
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: SecretString,
}

impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Gemini-compatible image generation API configuration.
#[derive(Clone)]
pub struct AiConfig {
    /// Base URL, e.g. `https://generativelanguage.googleapis.com/v1beta`
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl ServerConfig {
    /// Build a configuration with every optional setting at its default and
    /// every integration disabled.
    #[must_use]
    pub fn new(
        database_url: SecretString,
        jwt_secret: SecretString,
        public_base_url: &str,
        frontend_url: &str,
    ) -> Self {
        let frontend_url = frontend_url.trim_end_matches('/').to_owned();
        Self {
            database_url,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            public_base_url: public_base_url.trim_end_matches('/').to_owned(),
            cors_origins: vec![frontend_url.clone()],
            frontend_url,
            jwt: JwtConfig {
                secret: jwt_secret,
                ttl_hours: 168,
            },
            credits: CreditsConfig::default(),
            paypal: None,
            email: None,
            cloudinary: None,
            ai: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_required_secret("DATABASE_URL")?;
        let jwt_secret = get_validated_secret("JWT_SECRET")?;
        validate_jwt_secret(&jwt_secret, "JWT_SECRET")?;
        let public_base_url = get_required_env("PUBLIC_BASE_URL")?;
        let frontend_url = get_required_env("FRONTEND_URL")?;

        let mut config = Self::new(database_url, jwt_secret, &public_base_url, &frontend_url);

        config.host = parse_env_or_default("HOST", config.host)?;
        config.port = parse_env_or_default("PORT", config.port)?;
        config.jwt.ttl_hours = ensure_in_range(
            "JWT_TTL_HOURS",
            parse_env_or_default("JWT_TTL_HOURS", config.jwt.ttl_hours)?,
            &JWT_TTL_HOURS_RANGE,
        )?;
        config.credits.signup_bonus =
            parse_env_or_default("SIGNUP_BONUS_CREDITS", config.credits.signup_bonus)?;
        config.credits.generation_cost = ensure_in_range(
            "GENERATION_COST_CREDITS",
            parse_env_or_default("GENERATION_COST_CREDITS", config.credits.generation_cost)?,
            &GENERATION_COST_RANGE,
        )?;
        config.credits.require_verified_email = parse_env_or_default(
            "REQUIRE_EMAIL_VERIFICATION",
            config.credits.require_verified_email,
        )?;
        if let Some(origins) = get_optional_env("CORS_ORIGINS") {
            config.cors_origins = parse_origins(&origins);
        }

        config.paypal = PayPalConfig::from_env()?;
        config.email = EmailConfig::from_env()?;
        config.cloudinary = CloudinaryConfig::from_env()?;
        config.ai = AiConfig::from_env()?;

        config.sentry_dsn = get_optional_env("SENTRY_DSN");
        config.sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        config.sentry_sample_rate =
            parse_env_or_default("SENTRY_SAMPLE_RATE", config.sentry_sample_rate)?;
        config.sentry_traces_sample_rate =
            parse_env_or_default("SENTRY_TRACES_SAMPLE_RATE", config.sentry_traces_sample_rate)?;

        Ok(config)
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl PayPalConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (Some(client_id), Some(client_secret)) = (
            get_optional_env("PAYPAL_CLIENT_ID"),
            get_optional_env("PAYPAL_CLIENT_SECRET"),
        ) else {
            return Ok(None);
        };
        let mode = match get_env_or_default("PAYPAL_MODE", "sandbox").as_str() {
            "sandbox" => PayPalMode::Sandbox,
            "live" => PayPalMode::Live,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "PAYPAL_MODE".to_string(),
                    format!("expected 'sandbox' or 'live', got '{other}'"),
                ));
            }
        };
        validate_secret_strength(&client_secret, "PAYPAL_CLIENT_SECRET")?;
        Ok(Some(Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            mode,
        }))
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(api_key) = get_optional_env("RESEND_API_KEY") else {
            return Ok(None);
        };
        validate_secret_strength(&api_key, "RESEND_API_KEY")?;
        Ok(Some(Self {
            api_key: SecretString::from(api_key),
            from_address: get_env_or_default("EMAIL_FROM", "Pawdia AI <noreply@pawdia.ai>"),
        }))
    }
}

impl CloudinaryConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (Some(cloud_name), Some(api_key), Some(api_secret)) = (
            get_optional_env("CLOUDINARY_CLOUD_NAME"),
            get_optional_env("CLOUDINARY_API_KEY"),
            get_optional_env("CLOUDINARY_API_SECRET"),
        ) else {
            return Ok(None);
        };
        validate_secret_strength(&api_secret, "CLOUDINARY_API_SECRET")?;
        Ok(Some(Self {
            cloud_name,
            api_key,
            api_secret: SecretString::from(api_secret),
        }))
    }
}

impl AiConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(api_key) = get_optional_env("AI_API_KEY") else {
            return Ok(None);
        };
        validate_secret_strength(&api_key, "AI_API_KEY")?;
        Ok(Some(Self {
            base_url: get_env_or_default(
                "AI_API_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            )
            .trim_end_matches('/')
            .to_owned(),
            api_key: SecretString::from(api_key),
            model: get_env_or_default("AI_MODEL", "gemini-2.5-flash-image"),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an optional environment variable, falling back to `default`.
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Reject `value` unless it lies within `range`.
fn ensure_in_range<T>(key: &str, value: T, range: &RangeInclusive<T>) -> Result<T, ConfigError>
where
    T: PartialOrd + Display,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!(
                "{value} is outside {}..={}",
                range.start(),
                range.end()
            ),
        ))
    }
}

/// Split a comma-separated origin list.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Validate that the JWT secret meets minimum length requirements.
fn validate_jwt_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig::new(
            SecretString::from("postgres://localhost/pawdia_test"),
            SecretString::from("k9$Vq2!xLm7@Rt4#Wz8^Hn3&Pb6*Jc1%"),
            "http://localhost:3000/",
            "http://localhost:5173/",
        )
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_jwt_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_jwt_secret(&secret, "JWT_SECRET").is_err());
    }

    #[test]
    fn test_new_trims_trailing_slashes() {
        let config = test_config();
        assert_eq!(config.public_base_url, "http://localhost:3000");
        assert_eq!(config.frontend_url, "http://localhost:5173");
        assert_eq!(config.cors_origins, vec!["http://localhost:5173".to_string()]);
        assert!(config.paypal.is_none());
    }

    #[test]
    fn test_socket_addr() {
        let addr = test_config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("https://pawdia.ai/, https://www.pawdia.ai ,,"),
            vec![
                "https://pawdia.ai".to_string(),
                "https://www.pawdia.ai".to_string()
            ]
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let paypal = PayPalConfig {
            client_id: "client_id_value".to_string(),
            client_secret: SecretString::from("super_secret_paypal"),
            mode: PayPalMode::Sandbox,
        };
        let debug_output = format!("{paypal:?}");
        assert!(debug_output.contains("client_id_value"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_paypal"));

        let jwt_debug = format!("{:?}", test_config().jwt);
        assert!(!jwt_debug.contains("k9$Vq2"));
    }

    #[test]
    fn test_ensure_in_range() {
        assert_eq!(
            ensure_in_range("JWT_TTL_HOURS", 168, &JWT_TTL_HOURS_RANGE).unwrap(),
            168
        );
        for bad in [0, -1, 8761, i64::MAX / 2] {
            assert!(matches!(
                ensure_in_range("JWT_TTL_HOURS", bad, &JWT_TTL_HOURS_RANGE),
                Err(ConfigError::InvalidEnvVar(key, _)) if key == "JWT_TTL_HOURS"
            ));
        }
        assert!(ensure_in_range("GENERATION_COST_CREDITS", 0, &GENERATION_COST_RANGE).is_err());
        assert!(ensure_in_range("GENERATION_COST_CREDITS", 1, &GENERATION_COST_RANGE).is_ok());
    }

    #[test]
    fn test_defaults_are_in_range() {
        let config = test_config();
        assert!(JWT_TTL_HOURS_RANGE.contains(&config.jwt.ttl_hours));
        assert!(GENERATION_COST_RANGE.contains(&config.credits.generation_cost));
    }

    #[test]
    fn test_paypal_mode_api_base() {
        assert!(PayPalMode::Sandbox.api_base().contains("sandbox"));
        assert!(!PayPalMode::Live.api_base().contains("sandbox"));
    }
}
