//! Business logic and external API clients.
//!
//! # Services
//!
//! - `auth` - Password accounts, email verification, password reset
//! - `tokens` - JWT access tokens and one-time email tokens
//! - `credits` - Spending, refunding and admin adjustment of credits
//! - `checkout` - Server-side pricing, PayPal checkout and order fulfilment
//! - `paypal` - PayPal Orders v2 client
//! - `email` - Resend transactional email
//! - `cloudinary` - Signed image uploads
//! - `generation` - Gemini-compatible portrait generation

pub mod auth;
pub mod checkout;
pub mod cloudinary;
pub mod credits;
pub mod email;
pub mod generation;
pub mod paypal;
pub mod tokens;
