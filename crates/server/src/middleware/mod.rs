//! HTTP middleware stack for the API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (propagate or generate `x-request-id`)
//! 4. CORS (origins from `CORS_ORIGINS`)
//! 5. Security headers
//! 6. Rate limiting (governor) on `/api/auth` and `/api/generate`
//!
//! Authentication is done per handler with the extractors in [`auth`].

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use auth::{AuthUser, OptionalAuth, RequireAdmin, RequireAuth};
pub use rate_limit::{auth_rate_limiter, generation_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
