//! Core types for Pawdia.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod credits;
pub mod email;
pub mod id;
pub mod price;
pub mod short_link;
pub mod status;
pub mod subscription;

pub use credits::{Credits, CreditsError};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use short_link::{ShortLinkId, ShortLinkIdError};
pub use status::*;
pub use subscription::{
    SUBSCRIPTION_PERIOD_DAYS, Subscription, SubscriptionPlan, SubscriptionStatus,
};
